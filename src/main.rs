#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mapshade_lib::run().await
}
