#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub redis: Redis,
    pub message_stream: MessageStream,
    pub http_client: HttpClient,
    pub services: Services,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
}

impl Database {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.db_name
        )
    }
}

#[derive(Debug, Clone)]
pub struct Redis {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl Redis {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageStream {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub exchange_name: String,
}

impl MessageStream {
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    pub timeout: u64,
    pub consecutive_failures: u32,
    pub error_rate: f64,
    pub threshold: u64,
    /// `consecutive` or `error_rate`.
    pub breaker_type: String,
}

#[derive(Debug, Clone)]
pub struct Services {
    pub user_service_host: String,
    pub user_service_port: u16,
    pub ticket_service_host: String,
    pub ticket_service_port: u16,
    pub payment_service_endpoint: String,
}

impl Services {
    pub fn user_service_base(&self) -> String {
        format!("http://{}:{}", self.user_service_host, self.user_service_port)
    }

    pub fn ticket_service_base(&self) -> String {
        format!(
            "http://{}:{}",
            self.ticket_service_host, self.ticket_service_port
        )
    }
}
