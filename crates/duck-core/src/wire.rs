//! Request/response envelopes for the resolver wire protocol.
//!
//! Unlike the fixed records, these are schema-evolutionary struct
//! messages: each present field is `(field_id varuint, byte_length
//! varuint, value)`, terminated by field id 0. The byte length lets a
//! decoder skip fields it does not know, so adding a field is
//! backward-compatible.

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::lockfile::Lockfile;
use crate::manifest::PartialManifest;
use crate::{Error, Result};

/// Content type selecting the binary codec on the wire; anything else is
/// treated as JSON.
pub const BINARY_CONTENT_TYPE: &str = "application/vnd.package-peechy";

/// Error codes carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum WireErrorCode {
    Generic = 1,
    MissingPackageName = 2,
    ServerDown = 3,
    VersionDoesntExist = 4,
}

impl TryFrom<u64> for WireErrorCode {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        match value {
            1 => Ok(Self::Generic),
            2 => Ok(Self::MissingPackageName),
            3 => Ok(Self::ServerDown),
            4 => Ok(Self::VersionDoesntExist),
            other => Err(Error::Decode(format!("invalid error code {other}"))),
        }
    }
}

fn write_field(w: &mut ByteWriter, id: u64, payload: ByteWriter) {
    w.write_varuint(id);
    w.write_varuint(payload.len() as u64);
    w.write_bytes(&payload.into_bytes());
}

fn write_string_field(w: &mut ByteWriter, id: u64, value: &str) {
    let mut payload = ByteWriter::new();
    payload.write_string(value);
    write_field(w, id, payload);
}

fn read_field<'a>(r: &mut ByteReader<'a>) -> Result<Option<(u64, ByteReader<'a>)>> {
    let id = r.read_varuint()?;
    if id == 0 {
        return Ok(None);
    }
    let len = r.read_varuint()? as usize;
    let slice = r.read_slice(len)?;
    Ok(Some((id, ByteReader::new(slice))))
}

/// A resolution request: the root manifest plus client identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PartialManifest>,
}

impl PackageRequest {
    pub fn encode(&self, w: &mut ByteWriter) {
        if let Some(client_version) = &self.client_version {
            write_string_field(w, 1, client_version);
        }
        if let Some(name) = &self.name {
            write_string_field(w, 2, name);
        }
        if let Some(manifest) = &self.manifest {
            let mut payload = ByteWriter::new();
            manifest.encode(&mut payload);
            write_field(w, 3, payload);
        }
        w.write_varuint(0);
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let mut request = Self::default();
        while let Some((id, mut field)) = read_field(r)? {
            match id {
                1 => request.client_version = Some(field.read_string()?),
                2 => request.name = Some(field.read_alphanumeric()?),
                3 => request.manifest = Some(PartialManifest::decode(&mut field)?),
                _ => {} // unknown field: skipped by the length prefix
            }
        }
        Ok(request)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut ByteReader::new(bytes))
    }
}

/// A resolution response: a lockfile on success, an error code otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Lockfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<WireErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PackageResponse {
    pub fn encode(&self, w: &mut ByteWriter) {
        if let Some(name) = &self.name {
            write_string_field(w, 1, name);
        }
        if let Some(result) = &self.result {
            let mut payload = ByteWriter::new();
            result.encode(&mut payload);
            write_field(w, 2, payload);
        }
        if let Some(error_code) = self.error_code {
            let mut payload = ByteWriter::new();
            payload.write_varuint(error_code as u64);
            write_field(w, 3, payload);
        }
        if let Some(message) = &self.message {
            write_string_field(w, 4, message);
        }
        w.write_varuint(0);
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let mut response = Self::default();
        while let Some((id, mut field)) = read_field(r)? {
            match id {
                1 => response.name = Some(field.read_alphanumeric()?),
                2 => response.result = Some(Lockfile::decode(&mut field)?),
                3 => response.error_code = Some(WireErrorCode::try_from(field.read_varuint()?)?),
                4 => response.message = Some(field.read_string()?),
                _ => {}
            }
        }
        Ok(response)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut ByteReader::new(bytes))
    }
}
