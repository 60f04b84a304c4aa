use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Wrapper type whose "identity" for equality and hashing is determined from the shared pointer
/// itself and not from the underlying data.
///
/// Holding the `Arc` keeps the allocation alive, so the address can't be recycled while the key is
/// in a map.
#[derive(Debug)]
pub struct RefId<T>(pub Arc<T>);

impl<T> Clone for RefId<T> {
    fn clone(&self) -> Self {
        RefId(self.0.clone())
    }
}

impl<T> Hash for RefId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state)
    }
}

impl<T> PartialEq for RefId<T> {
    fn eq(&self, other: &RefId<T>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for RefId<T> {}
