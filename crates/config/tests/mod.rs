//! Configuration workflows across network types.

mod integration_tests {
    use peerwire_config::{NetworkType, NodeConfig, DEFAULT_PORT, MAX_MESSAGE_SIZE};

    #[test]
    fn test_networks_have_distinct_parameters() {
        let networks = [NetworkType::MainNet, NetworkType::TestNet, NetworkType::Regtest];

        for (i, a) in networks.iter().enumerate() {
            for b in &networks[i + 1..] {
                assert_ne!(a.magic(), b.magic(), "{a} and {b} share a magic");
                assert_ne!(a.default_port(), b.default_port(), "{a} and {b} share a port");
            }
            assert_eq!(a.to_string().parse::<NetworkType>(), Ok(*a));
        }
        assert_eq!(NetworkType::default().default_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_written_config_loads_back() {
        let mut config = NodeConfig::default();
        config.network.network = NetworkType::TestNet;
        config.network.peers = vec!["10.1.2.3".to_string(), "[::1]:18333".to_string()];
        config.session.max_in_flight = 2;
        config.logging.format = "json".to_string();

        let text = toml::to_string(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peerwire.toml");
        std::fs::write(&path, text).unwrap();

        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.session.max_message_size, MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_oversized_message_limit_rejected() {
        let text = format!("[session]\nmax_message_size = {}\n", u64::from(u32::MAX) + 1);
        assert!(NodeConfig::from_toml_str(&text).is_err());
    }
}
