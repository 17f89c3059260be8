//! Dataset readers and the city/ASN pair they form.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use crate::error::{LoadError, ReaderError};

/// File name of the city dataset inside the storage directory.
pub const CITY_DB_FILE: &str = "city.mmdb";

/// File name of the ASN dataset inside the storage directory.
pub const ASN_DB_FILE: &str = "asn.mmdb";

/// A decoded dataset record.
pub type Record = serde_json::Value;

/// An opened dataset file answering point lookups by address.
///
/// Closing a reader is dropping it.
pub trait DatasetReader: Send + Sync + Sized + 'static {
    /// Open the dataset stored at `path`.
    fn open(path: &Path) -> Result<Self, ReaderError>;

    /// Look up `ip`, returning `None` when the dataset has no entry for it.
    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<Record>, ReaderError>;

    /// Build time of the dataset in seconds since the Unix epoch, if known.
    fn build_epoch(&self) -> Option<u64> {
        None
    }
}

/// MaxMind DB reader backed by the whole file read into memory.
pub struct MmdbReader {
    inner: maxminddb::Reader<Vec<u8>>,
}

impl DatasetReader for MmdbReader {
    fn open(path: &Path) -> Result<Self, ReaderError> {
        let inner = maxminddb::Reader::open_readfile(path)?;
        Ok(Self { inner })
    }

    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<Record>, ReaderError> {
        match self.inner.lookup::<Record>(IpAddr::V4(ip)) {
            Ok(record) => Ok(Some(record)),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn build_epoch(&self) -> Option<u64> {
        Some(self.inner.metadata.build_epoch)
    }
}

/// Locations of the two dataset files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub city: PathBuf,
    pub asn: PathBuf,
}

impl DatasetPaths {
    /// Conventional layout: `city.mmdb` and `asn.mmdb` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            city: dir.join(CITY_DB_FILE),
            asn: dir.join(ASN_DB_FILE),
        }
    }
}

/// The city and ASN readers, always opened and replaced together.
pub struct DatasetSet<R> {
    city: R,
    asn: R,
}

impl<R: DatasetReader> DatasetSet<R> {
    /// Open both datasets.
    ///
    /// If the ASN file fails to open, the already opened city reader is
    /// dropped before the error is returned.
    pub fn open(paths: &DatasetPaths) -> Result<Self, LoadError> {
        let city = R::open(&paths.city).map_err(|source| LoadError {
            path: paths.city.clone(),
            source,
        })?;
        let asn = R::open(&paths.asn).map_err(|source| LoadError {
            path: paths.asn.clone(),
            source,
        })?;
        Ok(Self { city, asn })
    }

    /// Assemble a pair from readers that are already open.
    pub fn from_readers(city: R, asn: R) -> Self {
        Self { city, asn }
    }

    pub fn city(&self) -> &R {
        &self.city
    }

    pub fn asn(&self) -> &R {
        &self.asn
    }
}
