//! Byte-level routers with typed views.
//!
//! A [`Router<Vec<u8>>`] can be shared between parts of a program that agree
//! on a wire format but not on a Rust type. [`EncodedRouter`] wraps such a
//! router and encodes on `send`, decoding again on delivery.

use crate::error::{Result, RouterError};
use crate::router::{Router, SubscriptionHandle};
use crate::scope::Scope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use tracing::warn;

/// Encoded item payload.
pub type Bytes = Vec<u8>;

/// A serialization format for routed items.
pub trait Codec: Send + Sync + 'static {
    /// Format name used in logs.
    const NAME: &'static str;

    fn encode<T: Serialize>(value: &T) -> Result<Bytes>;

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

/// JSON via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    const NAME: &'static str = "json";

    fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| RouterError::Deserialization(e.to_string()))
    }
}

/// MessagePack via `rmp-serde`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Typed view over a byte router.
pub struct EncodedRouter<T, C = JsonCodec> {
    inner: Router<Bytes>,
    _types: PhantomData<fn() -> (T, C)>,
}

impl<T, C> Clone for EncodedRouter<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _types: PhantomData,
        }
    }
}

impl<T, C: Codec> fmt::Debug for EncodedRouter<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedRouter")
            .field("codec", &C::NAME)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<T, C> EncodedRouter<T, C>
where
    T: Serialize + DeserializeOwned + 'static,
    C: Codec,
{
    pub fn new(inner: Router<Bytes>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }

    /// Underlying byte router.
    pub fn raw(&self) -> &Router<Bytes> {
        &self.inner
    }

    /// Encode and broadcast `item`.
    pub fn send(&self, item: &T) -> Result<usize> {
        self.inner.send(C::encode(item)?)
    }

    /// Typed [`Router::subscribe`]. Payloads that fail to decode are skipped.
    pub fn subscribe<F>(&self, scope: &Scope, on_item: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.inner.subscribe(scope, decoding::<T, C, F>(on_item))
    }

    /// Typed [`Router::tail`]. Payloads that fail to decode are skipped.
    pub fn tail<F>(&self, scope: &Scope, on_item: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.inner.tail(scope, decoding::<T, C, F>(on_item))
    }

    /// Decoded snapshot of the cache.
    ///
    /// Fails on the first payload that does not decode as `T`.
    pub fn items(&self) -> Result<Vec<T>> {
        self.inner
            .items()?
            .iter()
            .map(|bytes| C::decode(bytes))
            .collect()
    }

    pub fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

fn decoding<T, C, F>(mut on_item: F) -> impl FnMut(Bytes) + Send + 'static
where
    T: DeserializeOwned + 'static,
    C: Codec,
    F: FnMut(T) + Send + 'static,
{
    move |bytes: Bytes| match C::decode::<T>(&bytes) {
        Ok(item) => on_item(item),
        Err(e) => warn!(
            codec = C::NAME,
            item = std::any::type_name::<T>(),
            error = %e,
            "skipping undecodable payload"
        ),
    }
}
