//! Serialization capability shared by the router and the performer.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Turns typed values into message content and back.
///
/// Methods are generic, so codecs are used by static dispatch
/// (`Router<C>`, `Performer<C>`) rather than as trait objects.
pub trait Codec: Clone + Send + Sync + 'static {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

/// The default codec: `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(CodecError::encode::<T>)
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(CodecError::decode::<T>)
    }
}

/// Encode `value` as text, for codec output embedded inside another envelope.
pub(crate) fn encode_text<C, T>(codec: &C, value: &T) -> Result<String, CodecError>
where
    C: Codec,
    T: Serialize + ?Sized,
{
    let bytes = codec.encode(value)?;
    String::from_utf8(bytes).map_err(CodecError::encode::<T>)
}
