use serde_json::json;

use crate::api::Reply;
use crate::store::Store;

/// `GET /v2/system-info`
pub fn system_info(store: &Store) -> Reply {
    Reply::sync(json!(store.system))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_series_and_classic_flag() {
        let mut store = Store::default();
        store.system.on_classic = false;
        let Reply::Sync { result, .. } = system_info(&store) else {
            panic!("expected sync reply");
        };
        assert_eq!(result["series"], "16");
        assert_eq!(result["on-classic"], false);
        assert_eq!(result["os-release"]["id"], "ubuntu");
    }
}
