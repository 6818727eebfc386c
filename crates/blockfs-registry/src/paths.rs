//! Registry Key Layout
//!
//! All registry records live under one configurable root prefix:
//!
//! ```text
//! <prefix>/hosts/<host_id>     -> HostConfig (JSON)
//! <prefix>/volumes/<volume_id> -> LogicalVolumeConfig (JSON)
//! ```

pub const DEFAULT_PREFIX: &str = "/bfs";

pub fn hosts_prefix(root: &str) -> String {
    format!("{}/hosts/", root.trim_end_matches('/'))
}

pub fn volumes_prefix(root: &str) -> String {
    format!("{}/volumes/", root.trim_end_matches('/'))
}

pub fn host_key(root: &str, host_id: &str) -> String {
    format!("{}{}", hosts_prefix(root), host_id)
}

pub fn volume_key(root: &str, volume_id: &str) -> String {
    format!("{}{}", volumes_prefix(root), volume_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_nest_under_the_root_prefix() {
        assert_eq!(hosts_prefix("/bfs"), "/bfs/hosts/");
        assert_eq!(volumes_prefix("/bfs/"), "/bfs/volumes/");
        assert_eq!(host_key(DEFAULT_PREFIX, "h1"), "/bfs/hosts/h1");
        assert_eq!(volume_key("/prod/bfs", "lv0"), "/prod/bfs/volumes/lv0");
    }
}
