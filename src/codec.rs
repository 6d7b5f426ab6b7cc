use crate::error::{RepcacheError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Turns a daemon's retention object into the opaque bytes stored under its key.
pub trait RetentionCodec {
    type Object;

    fn encode(&self, object: &Self::Object) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Self::Object>;
}

/// serde_json encoding for any serde-capable retention object.
#[derive(Debug)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> RetentionCodec for JsonCodec<T> {
    type Object = T;

    fn encode(&self, object: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(object).map_err(|e| RepcacheError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| RepcacheError::Codec(e.to_string()))
    }
}

/// Gzip layer over another codec, for retention objects near the server's item size limit.
#[cfg(feature = "compression")]
#[derive(Debug, Clone, Default)]
pub struct GzipCodec<C> {
    inner: C,
}

#[cfg(feature = "compression")]
impl<C> GzipCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[cfg(feature = "compression")]
impl<C: RetentionCodec> RetentionCodec for GzipCodec<C> {
    type Object = C::Object;

    fn encode(&self, object: &Self::Object) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let raw = self.inner.encode(object)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::fast());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Self::Object> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut raw = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| RepcacheError::Codec(format!("gzip: {}", e)))?;
        self.inner.decode(&raw)
    }
}
