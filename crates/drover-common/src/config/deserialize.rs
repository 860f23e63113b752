use serde::Deserialize;

/// Deserializes an empty string as [`None`].
///
/// TOML has no null value, so optional string settings are written as `""`
/// in the default configuration and mapped to `None` here.
pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|x| !x.is_empty()))
}
