//! Combined city + ASN lookup over the active dataset pair.

use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::dataset::{DatasetReader, MmdbReader, Record};
use crate::error::LookupError;
use crate::store::DatasetStore;

/// Result of resolving one address against both datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    #[serde(rename = "ip")]
    pub address: Ipv4Addr,
    pub city: Option<Record>,
    pub asn: Option<Record>,
}

/// Answers lookups by reading through a [`DatasetStore`].
pub struct LookupService<R = MmdbReader> {
    store: Arc<DatasetStore<R>>,
}

impl<R> Clone for LookupService<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<R: DatasetReader> LookupService<R> {
    pub fn new(store: Arc<DatasetStore<R>>) -> Self {
        Self { store }
    }

    /// Resolve an address that has already been checked to be public IPv4.
    ///
    /// Both readers are queried under one shared guard, so the result never
    /// mixes two dataset generations. Any reader failure fails the call.
    pub fn resolve(&self, address: Ipv4Addr) -> Result<LookupResult, LookupError> {
        self.store
            .with_readers(|set| -> Result<LookupResult, LookupError> {
                let city = set.city().lookup(address)?;
                let asn = set.asn().lookup(address)?;
                Ok(LookupResult { address, city, asn })
            })
            .unwrap_or(Err(LookupError::NotReady))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSet;
    use crate::error::ReaderError;
    use serde_json::json;
    use std::path::Path;

    /// In-memory reader answering from a fixed table.
    struct TableReader {
        entries: Vec<(Ipv4Addr, Record)>,
        broken: bool,
    }

    impl TableReader {
        fn with(entries: Vec<(Ipv4Addr, Record)>) -> Self {
            Self {
                entries,
                broken: false,
            }
        }

        fn broken() -> Self {
            Self {
                entries: Vec::new(),
                broken: true,
            }
        }
    }

    impl DatasetReader for TableReader {
        fn open(_path: &Path) -> Result<Self, ReaderError> {
            Err(ReaderError::new("in-memory only"))
        }

        fn lookup(&self, ip: Ipv4Addr) -> Result<Option<Record>, ReaderError> {
            if self.broken {
                return Err(ReaderError::new("invalid search tree"));
            }
            Ok(self
                .entries
                .iter()
                .find(|(addr, _)| *addr == ip)
                .map(|(_, record)| record.clone()))
        }
    }

    const GOOGLE_DNS: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

    fn service(city: TableReader, asn: TableReader) -> LookupService<TableReader> {
        let store = Arc::new(DatasetStore::new());
        store.swap(DatasetSet::from_readers(city, asn));
        LookupService::new(store)
    }

    #[test]
    fn test_resolve_both_records() {
        let svc = service(
            TableReader::with(vec![(GOOGLE_DNS, json!({"country": {"iso_code": "US"}}))]),
            TableReader::with(vec![(
                GOOGLE_DNS,
                json!({"autonomous_system_number": 15169}),
            )]),
        );

        let result = svc.resolve(GOOGLE_DNS).unwrap();
        assert_eq!(result.address, GOOGLE_DNS);
        assert_eq!(result.city, Some(json!({"country": {"iso_code": "US"}})));
        assert_eq!(result.asn, Some(json!({"autonomous_system_number": 15169})));
    }

    #[test]
    fn test_resolve_missing_entry_is_null() {
        let svc = service(
            TableReader::with(vec![(GOOGLE_DNS, json!({"city": "x"}))]),
            TableReader::with(Vec::new()),
        );

        let result = svc.resolve(GOOGLE_DNS).unwrap();
        assert!(result.city.is_some());
        assert!(result.asn.is_none());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"ip": "8.8.8.8", "city": {"city": "x"}, "asn": null})
        );
    }

    #[test]
    fn test_reader_failure_fails_whole_lookup() {
        let svc = service(
            TableReader::with(vec![(GOOGLE_DNS, json!({"city": "x"}))]),
            TableReader::broken(),
        );
        assert!(matches!(
            svc.resolve(GOOGLE_DNS),
            Err(LookupError::Dataset(_))
        ));
    }

    #[test]
    fn test_not_ready() {
        let svc = LookupService::<TableReader>::new(Arc::new(DatasetStore::new()));
        assert!(matches!(svc.resolve(GOOGLE_DNS), Err(LookupError::NotReady)));
    }
}
