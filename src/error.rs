//! Crate-wide error type. Each module defines its own focused error enum; this type composes
//! them for callers that cross module boundaries (the apply pipeline, the HTTP API, the
//! periodic tasks).

use crate::hub;
use crate::store;

/// Errors surfaced by the routing core to its callers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("hub {0} not found on map")]
    HubNotFound(crate::hub::HubId),

    #[error("map is empty")]
    EmptyMap,

    #[error("home hub is not set")]
    HomeHubUnset,

    #[error("all candidate pins are disregarded")]
    AllPinsDisregarded,

    #[error(transparent)]
    Hub(#[from] hub::Error),

    #[error(transparent)]
    Store(#[from] store::Error),

    #[error("no route found: {0}")]
    NoRoute(#[from] crate::route::NoRouteReason),
}

/// Marker distinguishing "stale data, not worth retrying" from a hard failure. "Open question",
/// callers must not depend on the message text of this error -- only its variant.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("data is older than the currently stored version")]
pub struct OldDataError;
