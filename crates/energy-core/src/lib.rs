// energy-core - Domain types shared by every energy-api crate
//
// - Renewable-share dataset loaded from CSV
// - Neighbour lookup (REST Countries or a static file)
// - Webhook registration records
// - Request key normalisation and path segment parsing

pub mod countries;
pub mod dataset;
pub mod registration;
pub mod request;

pub use countries::{CountriesError, NeighbourLookup, RestCountriesClient, StaticNeighbours};
pub use dataset::{
    DatasetError, DatasetProvider, RecordSet, RenewableDb, YearRange, YearRecord,
};
pub use registration::{Registration, RegistrationAction, RegistrationRequest};
pub use request::{normalize_request_key, path_segments};
