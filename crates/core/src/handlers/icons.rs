use crate::api::Reply;
use crate::error::ApiError;
use crate::store::Store;

/// `GET /v2/icons/{name}/icon`
pub fn get(store: &Store, name: &str) -> Result<Reply, ApiError> {
    let snap = store
        .find_snap(name)
        .ok_or_else(|| ApiError::not_found(format!("cannot find snap \"{name}\"")))?;
    let icon = snap
        .icon
        .as_ref()
        .ok_or_else(|| ApiError::not_found("local snap has no icon"))?;
    Ok(Reply::Raw {
        content_type: icon.mime_type.clone(),
        body: icon.data.clone(),
    })
}
