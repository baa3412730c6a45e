//! Request handlers, one module per resource family.
//!
//! Every handler is a plain function over the [`Store`](crate::store::Store)
//! it is handed; the transport layer owns locking and envelope encoding.

pub mod apps;
pub mod changes;
pub mod conf;
pub mod connections;
pub mod find;
pub mod icons;
pub mod interfaces;
pub mod snaps;
pub mod system;
pub mod wire;

use crate::error::ApiError;
use crate::store::Store;

/// Fails every mutating action while auth decline injection is on.
pub(crate) fn authorize(store: &Store) -> Result<(), ApiError> {
    if store.settings.decline_auth {
        return Err(ApiError::auth_cancelled());
    }
    Ok(())
}
