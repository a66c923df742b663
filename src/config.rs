/// Client configuration options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// List of `host:port` entries for the zookeeper ensemble.
    #[serde(default = "ClientConfig::default_servers")]
    pub servers: Vec<String>,

    /// Session timeout, in milliseconds.
    #[serde(default = "ClientConfig::default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Root path all operations are namespaced under (default: `/`).
    #[serde(default = "ClientConfig::default_chroot")]
    pub chroot: String,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            servers: ClientConfig::default_servers(),
            session_timeout_ms: ClientConfig::default_session_timeout_ms(),
            chroot: ClientConfig::default_chroot(),
        }
    }
}

impl ClientConfig {
    fn default_servers() -> Vec<String> {
        vec!["localhost:2181".into()]
    }

    fn default_session_timeout_ms() -> u64 {
        10_000
    }

    fn default_chroot() -> String {
        "/".into()
    }

    /// Join `servers` into the connection string `zookeeper::ZooKeeper::connect` expects.
    pub fn connect_string(&self) -> String {
        self.servers.join(",")
    }
}


#[cfg(test)]
mod tests {
    use super::ClientConfig;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.servers, vec!["localhost:2181".to_string()]);
        assert_eq!(config.session_timeout_ms, 10_000);
        assert_eq!(config.chroot, "/");
    }

    #[test]
    fn connect_string_joins_servers() {
        let mut config = ClientConfig::default();
        config.servers = vec!["a:2181".into(), "b:2181".into(), "c:2181".into()];
        assert_eq!(config.connect_string(), "a:2181,b:2181,c:2181");
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.servers, ClientConfig::default_servers());
    }

    #[test]
    fn deserialize_overrides() {
        let json = r#"{"servers": ["zk1:2181"], "session_timeout_ms": 5000}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.servers, vec!["zk1:2181".to_string()]);
        assert_eq!(config.session_timeout_ms, 5000);
    }
}
