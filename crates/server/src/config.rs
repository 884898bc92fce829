use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub scene_path: Option<PathBuf>,
    pub max_clients: usize,
    pub outbound_warn_threshold: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: scenesync::DEFAULT_PORT,
            scene_path: None,
            max_clients: 64,
            outbound_warn_threshold: 1024,
        }
    }
}
