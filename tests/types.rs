// ABOUTME: Integration tests for identifiers and validated value types.
// ABOUTME: Tests parsing, validation, and serialized forms.

use cutover::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn bare_name_defaults_to_latest() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.repository(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert_eq!(img.version(), "nginx:latest");
    }

    #[test]
    fn registry_with_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/acme/feed").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.repository(), "acme/feed");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn digest_is_the_version() {
        let img = ImageRef::parse("ghcr.io/acme/feed:v2@sha256:abc123").unwrap();
        assert_eq!(img.tag(), Some("v2"));
        assert_eq!(img.digest(), Some("sha256:abc123"));
        assert_eq!(img.version(), "sha256:abc123");
        assert_eq!(img.to_string(), "ghcr.io/acme/feed:v2@sha256:abc123");
    }

    #[test]
    fn same_digest_different_tags_share_a_version() {
        let a = ImageRef::parse("ghcr.io/acme/feed:v2@sha256:abc123").unwrap();
        let b = ImageRef::parse("ghcr.io/acme/feed:stable@sha256:abc123").unwrap();
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn malformed_references_are_rejected() {
        for bad in ["", "feed:", "feed@nodigest", "feed name", "ghcr.io/"] {
            assert!(ImageRef::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}

mod endpoint_tests {
    use super::*;

    #[test]
    fn parse_host_and_port() {
        let ep = Endpoint::parse("10.0.1.10:8080").unwrap();
        assert_eq!(ep.host(), "10.0.1.10");
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.to_string(), "10.0.1.10:8080");
    }

    #[test]
    fn parse_ipv6_literal() {
        let ep = Endpoint::parse("[::1]:9000").unwrap();
        assert_eq!(ep.host(), "[::1]");
        assert_eq!(ep.port(), 9000);
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(matches!(
            Endpoint::parse("10.0.1.10"),
            Err(ParseEndpointError::MissingPort(_))
        ));
        assert!(matches!(
            Endpoint::parse(":8080"),
            Err(ParseEndpointError::MissingHost(_))
        ));
        assert!(matches!(
            Endpoint::parse("host:99999"),
            Err(ParseEndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn serializes_as_string() {
        let ep = Endpoint::new("db", 5432);
        assert_eq!(serde_json::to_string(&ep).unwrap(), "\"db:5432\"");
        let back: Endpoint = serde_json::from_str("\"db:5432\"").unwrap();
        assert_eq!(back, ep);
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn accepts_dns_label() {
        assert_eq!(ServiceName::new("feed-api-2").unwrap().as_str(), "feed-api-2");
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(matches!(ServiceName::new(""), Err(ServiceNameError::Empty)));
        assert!(matches!(
            ServiceName::new("Feed"),
            Err(ServiceNameError::InvalidChar('F'))
        ));
        assert!(matches!(
            ServiceName::new("-feed"),
            Err(ServiceNameError::BadEdge)
        ));
        assert!(matches!(
            ServiceName::new(&"a".repeat(64)),
            Err(ServiceNameError::TooLong)
        ));
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<ServiceName>("\"feed\"").is_ok());
        assert!(serde_json::from_str::<ServiceName>("\"no spaces\"").is_err());
    }
}

mod color_tests {
    use super::*;

    #[test]
    fn other_flips_color() {
        assert_eq!(Color::Blue.other(), Color::Green);
        assert_eq!(Color::Green.other(), Color::Blue);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("GREEN".parse::<Color>().unwrap(), Color::Green);
        assert!("red".parse::<Color>().is_err());
    }

    #[test]
    fn listener_kinds_display() {
        assert_eq!(ListenerKind::Production.to_string(), "production");
        assert_eq!(ListenerKind::Test.to_string(), "test");
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = DeploymentId::generate();
        let b = DeploymentId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("d-"));
        assert!(RequestId::generate().as_str().starts_with("r-"));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = RequestId::new("pipeline-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pipeline-7\"");
    }
}
