use serde::{Deserialize, Deserializer};

pub mod exam;
pub mod grading;
pub mod submission;

/// The services write unset fields as explicit `null`; treat those like a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
