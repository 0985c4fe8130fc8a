//! Re-shape a handler's output into a caller's type via its JSON form

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize `source` to JSON and deserialize it as `T`.
///
/// # Errors
///
/// Returns error if either step fails.
pub fn reshape<S, T>(source: &S) -> Result<T, ConvertError>
where
    S: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let value = serde_json::to_value(source).map_err(|e| ConvertError::Serialize(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ConvertError::Deserialize(e.to_string()))
}

/// Best-effort [`reshape`] into `target`; on failure `target` is left untouched.
pub fn receive<S, T>(source: &S, target: &mut T)
where
    S: Serialize + ?Sized,
    T: DeserializeOwned,
{
    if let Ok(value) = reshape(source) {
        *target = value;
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("cannot serialize source: {0}")]
    Serialize(String),
    #[error("cannot deserialize into target: {0}")]
    Deserialize(String),
}
