//! Serde helpers for file-system paths
//!
//! serde refuses to serialize a `PathBuf` that is not valid UTF-8, while
//! Linux file names may be arbitrary bytes.
//!
//! - [`raw`] is lossless: UTF-8 paths are written as strings, anything else
//!   as the raw byte array. Used on the worker wire.
//! - [`lossy`] always writes a string, replacing invalid sequences with
//!   U+FFFD. Used for the human-facing output document.

use serde::{Deserialize, Deserializer, Serializer};
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
#[serde(untagged)]
enum PathRepr {
    Text(String),
    Bytes(Vec<u8>),
}

pub mod raw {
    use super::*;

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        match path.to_str() {
            Some(text) => serializer.serialize_str(text),
            None => serializer.serialize_bytes(&os_bytes(path)),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        Ok(match PathRepr::deserialize(deserializer)? {
            PathRepr::Text(text) => PathBuf::from(text),
            PathRepr::Bytes(bytes) => path_from_bytes(bytes),
        })
    }

    #[cfg(unix)]
    fn os_bytes(path: &Path) -> Vec<u8> {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }

    #[cfg(not(unix))]
    fn os_bytes(path: &Path) -> Vec<u8> {
        path.to_string_lossy().into_owned().into_bytes()
    }

    #[cfg(unix)]
    fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }

    #[cfg(not(unix))]
    fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub mod lossy {
    use super::*;

    pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&path.to_string_lossy())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        PathBuf::deserialize(deserializer)
    }
}
