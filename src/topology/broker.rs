use derive_more::Display;

#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct BrokerId(pub i32);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Broker {
    pub id: BrokerId,
    pub host: String,
    pub port: u16,
}

impl Broker {
    pub fn new<H: Into<String>>(id: i32, host: H, port: u16) -> Self {
        Self {
            id: BrokerId(id),
            host: host.into(),
            port,
        }
    }

    /// The `host:port` pair clients connect to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::Broker;

    #[test]
    fn addr() {
        let broker = Broker::new(1, "kafka-1.local", 9092);
        assert_eq!("kafka-1.local:9092", broker.addr());
        assert_eq!("1", broker.id.to_string());
    }
}
