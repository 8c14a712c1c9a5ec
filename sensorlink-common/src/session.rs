use rumqttc::{MqttOptions, QoS};
use url::Url;

use crate::config::MqttConfig;
use crate::error::{Error, Result};

/// Default MQTT port when the broker URL omits one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Host and port of an MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parse a broker URL such as `tcp://localhost:1883` or `mqtt://broker`.
    ///
    /// Only plain TCP schemes (`tcp`, `mqtt`) are accepted.
    pub fn parse(broker: &str) -> Result<Self> {
        let invalid = |reason: String| Error::BrokerAddress {
            address: broker.to_string(),
            reason,
        };

        let url = Url::parse(broker).map_err(|e| invalid(e.to_string()))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            other => {
                return Err(invalid(format!(
                    "unsupported scheme '{}', expected 'tcp' or 'mqtt'",
                    other
                )));
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
        })
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Map a numeric QoS level to the client's enum.
pub fn parse_qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::Config(format!(
            "Invalid MQTT QoS {}. Expected 0, 1 or 2",
            other
        ))),
    }
}

/// Build client options from the MQTT configuration.
pub fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions> {
    let address = BrokerAddress::parse(&config.broker)?;

    if config.keep_alive_secs == 0 {
        return Err(Error::Config(
            "keep_alive_secs must be at least 1".to_string(),
        ));
    }

    let mut options = MqttOptions::new(&config.client_id, &address.host, address.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(config.clean_session);

    if let Some(ref username) = config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }

    tracing::debug!(
        broker = %address,
        client_id = %config.client_id,
        clean_session = config.clean_session,
        "Built MQTT client options"
    );

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_broker() {
        let address = BrokerAddress::parse("tcp://broker.local:1884").unwrap();
        assert_eq!(address.host, "broker.local");
        assert_eq!(address.port, 1884);
        assert_eq!(address.to_string(), "broker.local:1884");
    }

    #[test]
    fn test_parse_default_port() {
        let address = BrokerAddress::parse("mqtt://10.0.0.5").unwrap();
        assert_eq!(address.host, "10.0.0.5");
        assert_eq!(address.port, DEFAULT_MQTT_PORT);
    }

    #[test]
    fn test_parse_rejects_unsupported_scheme() {
        let result = BrokerAddress::parse("ws://broker:8080");
        assert!(matches!(result, Err(Error::BrokerAddress { .. })));
        assert!(result.unwrap_err().to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(BrokerAddress::parse("localhost:1883:extra").is_err());
        assert!(BrokerAddress::parse("").is_err());
    }

    #[test]
    fn test_parse_qos() {
        assert_eq!(parse_qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(parse_qos(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(parse_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(parse_qos(3).is_err());
    }

    #[test]
    fn test_mqtt_options() {
        let mut config = MqttConfig::new("tcp://broker.local:1883");
        config.client_id = "bridge-test".to_string();
        config.username = Some("user".to_string());
        config.password = Some("pass".to_string());

        let options = mqtt_options(&config).unwrap();
        assert_eq!(options.client_id(), "bridge-test");
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "pass".to_string()))
        );
    }

    #[test]
    fn test_mqtt_options_rejects_zero_keep_alive() {
        let mut config = MqttConfig::new("tcp://broker.local:1883");
        config.keep_alive_secs = 0;
        assert!(matches!(mqtt_options(&config), Err(Error::Config(_))));
    }
}
