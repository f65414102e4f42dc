// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Accepts servers in compact string form or as detailed maps.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::ServerConfig;

pub fn deserialize_servers<'de, D>(deserializer: D) -> Result<NonEmpty<ServerConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<ServerEntry> = Vec::deserialize(deserializer)?;
    let servers = values
        .into_iter()
        .map(ServerEntry::into_server_config)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(servers)
        .ok_or_else(|| serde::de::Error::custom("at least one server is required"))
}

pub fn deserialize_server_option<'de, D>(deserializer: D) -> Result<Option<ServerConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<ServerEntry> = Option::deserialize(deserializer)?;
    opt.map(ServerEntry::into_server_config)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Simple(String),
    Detailed(ServerConfig),
}

impl ServerEntry {
    fn into_server_config(self) -> Result<ServerConfig, String> {
        match self {
            ServerEntry::Simple(s) => ServerConfig::parse(&s),
            ServerEntry::Detailed(c) => Ok(c),
        }
    }
}
