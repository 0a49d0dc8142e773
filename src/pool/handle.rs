use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::transport::Transport;
use crate::{Request, Response};

/// Shared handle to a pooled resource.
///
/// Equality and hashing use pointer identity: clones of one handle are equal, two handles
/// wrapping equal values are not. This makes a handle usable as a map key without requiring
/// anything of `T`.
pub struct Handle<T: ?Sized>(Arc<T>);

impl<T> Handle<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T: ?Sized> Handle<T> {
    pub fn from_arc(value: Arc<T>) -> Self {
        Self(value)
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.0
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state)
    }
}

impl<T: ?Sized> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&&*self.0).finish()
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Handle<T> {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        self.0.send(request).await
    }
}
