pub mod handle;
pub mod store;
pub mod view;

pub use handle::{AnnotationHandle, StoreSnapshot};
pub use store::AnnotationStore;
pub use view::ViewFocus;
