use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

/// A subscriber callback — sync or async — used for lifecycle event
/// fan-out (see [`crate::uploader::events`] and [`crate::pool`]).
pub enum EventCallback<T: Sync + Send + 'static> {
    Fn(Box<dyn Fn(T) + Send + Sync>),
    AsyncFn(Box<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl<T: Sync + Send + 'static> EventCallback<T> {
    /// Construct a subscriber from a plain function.
    pub fn from_fn<F>(fun: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        EventCallback::Fn(Box::new(fun))
    }

    /// Construct a subscriber from an async function.
    pub fn from_async_fn<F, R>(fun: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let fun = Arc::new(fun);
        EventCallback::AsyncFn(Box::new(move |value| {
            let fun = fun.clone();
            async move {
                let fun = fun.clone();
                fun(value).await;
            }
            .boxed()
        }))
    }

    /// Invokes the subscriber, isolating the caller from a panicking
    /// handler — one bad subscriber must not break the pool.
    pub async fn call(&self, value: T) {
        match self {
            EventCallback::Fn(fun) => {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fun(value))).is_err()
                {
                    tracing::error!("event subscriber panicked; dropping");
                }
            }
            EventCallback::AsyncFn(fun) => {
                let future = std::panic::AssertUnwindSafe(fun(value));
                if future.catch_unwind().await.is_err() {
                    tracing::error!("event subscriber panicked; dropping");
                }
            }
        }
    }
}
