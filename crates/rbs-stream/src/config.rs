use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Address and credentials of a Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                username: self.username.clone().filter(|u| !u.is_empty()),
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build-events stream and the consumer this process reads it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub server: ServerConfig,
    pub stream_key: String,
    pub group: String,
    pub consumer: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let group = "runners-cg:redis/redis/commits".to_string();
        Self {
            server: ServerConfig::default(),
            stream_key: "oss:api:gh/redis/redis/builds".to_string(),
            consumer: consumer_name(&group, 1),
            group,
        }
    }
}

/// `<group>-self-contained-proc#<index>`
pub fn consumer_name(group: &str, index: u32) -> String {
    format!("{group}-self-contained-proc#{index}")
}
