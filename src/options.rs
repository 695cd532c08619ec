//! Registry of recognised instance configuration options.
//!
//! Each `OptionDescriptor` names one setting, where it lives in
//! `config.<env>.json`, and optionally how to validate it. The registry is
//! built once at startup and handed to whoever needs it; it is never mutated.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::debug;

/// `Ok(())` when the value is acceptable, otherwise the message to show.
pub type Validation = Result<(), String>;

/// A validation rule for a single option value.
#[async_trait]
pub trait Validate: Send + Sync {
    async fn validate(&self, value: &Value) -> Validation;
}

struct FnValidator<F>(F);

#[async_trait]
impl<F> Validate for FnValidator<F>
where
    F: Fn(&Value) -> Validation + Send + Sync,
{
    async fn validate(&self, value: &Value) -> Validation {
        (self.0)(value)
    }
}

/// Wraps a synchronous closure as a validator.
pub fn validator_fn<F>(f: F) -> Arc<dyn Validate>
where
    F: Fn(&Value) -> Validation + Send + Sync + 'static,
{
    Arc::new(FnValidator(f))
}

/// Static description of one configuration option.
#[derive(Clone)]
pub struct OptionDescriptor {
    pub name: &'static str,
    /// Dotted path in the config file when it differs from `name`.
    pub config_path: Option<&'static str>,
    pub description: &'static str,
    pub validator: Option<Arc<dyn Validate>>,
}

impl OptionDescriptor {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            config_path: None,
            description,
            validator: None,
        }
    }

    pub fn at(mut self, config_path: &'static str) -> Self {
        self.config_path = Some(config_path);
        self
    }

    pub fn validated_by(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Dotted key used to look the option up in a config document.
    pub fn key(&self) -> &'static str {
        self.config_path.unwrap_or(self.name)
    }
}

impl std::fmt::Debug for OptionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionDescriptor")
            .field("name", &self.name)
            .field("config_path", &self.config_path)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

/// Ordered, immutable set of option descriptors.
#[derive(Debug, Clone)]
pub struct OptionRegistry {
    descriptors: Vec<OptionDescriptor>,
}

impl OptionRegistry {
    pub fn new(descriptors: Vec<OptionDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn builtin() -> Self {
        let url = validator_fn(validate_url);
        let port = Arc::new(PortAvailable);
        let port_number = validator_fn(|value| validate_port_number(value).map(|_| ()));
        Self::new(vec![
            OptionDescriptor::new("url", "Site url")
                .validated_by(Arc::clone(&url)),
            OptionDescriptor::new("admin-url", "Admin panel url")
                .at("admin.url")
                .validated_by(url),
            OptionDescriptor::new("port", "Port the server listens on")
                .at("server.port")
                .validated_by(port),
            OptionDescriptor::new("ip", "IP address the server listens on")
                .at("server.host")
                .validated_by(validator_fn(validate_ip)),
            OptionDescriptor::new("process", "Process manager used to run the instance")
                .validated_by(validator_fn(|value| {
                    one_of(value, &["local", "systemd"], "Invalid process manager")
                })),
            OptionDescriptor::new("db", "Database client")
                .at("database.client")
                .validated_by(validator_fn(|value| {
                    one_of(
                        value,
                        &["mysql", "sqlite3"],
                        "Invalid database type. Supported types are mysql and sqlite3",
                    )
                })),
            OptionDescriptor::new("dbhost", "Database host").at("database.connection.host"),
            OptionDescriptor::new("dbport", "Database port")
                .at("database.connection.port")
                .validated_by(Arc::clone(&port_number)),
            OptionDescriptor::new("dbuser", "Database username").at("database.connection.user"),
            OptionDescriptor::new("dbpass", "Database password")
                .at("database.connection.password"),
            OptionDescriptor::new("dbname", "Database name")
                .at("database.connection.database")
                .validated_by(validator_fn(validate_db_name)),
            OptionDescriptor::new("dbpath", "Sqlite database file")
                .at("database.connection.filename"),
            OptionDescriptor::new("mail", "Mail transport").at("mail.transport"),
            OptionDescriptor::new("mailservice", "Mail service").at("mail.options.service"),
            OptionDescriptor::new("mailuser", "Mail auth user").at("mail.options.auth.user"),
            OptionDescriptor::new("mailpass", "Mail auth password").at("mail.options.auth.pass"),
            OptionDescriptor::new("mailport", "Mail server port")
                .at("mail.options.port")
                .validated_by(port_number),
        ])
    }

    /// Descriptors that declare a validator, in registry order.
    pub fn validatable(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.descriptors.iter().filter(|d| d.validator.is_some())
    }
}

fn validate_url(value: &Value) -> Validation {
    const MESSAGE: &str =
        "Invalid URL. Your URL should include a protocol, E.g. http://my-ghost-blog.com";
    let Some(raw) = value.as_str() else {
        return Err(MESSAGE.to_string());
    };
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(MESSAGE.to_string()),
    }
}

fn validate_port_number(value: &Value) -> Result<u16, String> {
    let number = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    number
        .filter(|n| (1..=u64::from(u16::MAX)).contains(n))
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| "Port must be an integer.".to_string())
}

fn validate_ip(value: &Value) -> Validation {
    value
        .as_str()
        .and_then(|raw| raw.parse::<IpAddr>().ok())
        .map(|_| ())
        .ok_or_else(|| "Invalid IP address".to_string())
}

fn validate_db_name(value: &Value) -> Validation {
    let Some(name) = value.as_str() else {
        return Err("Database name must be a string".to_string());
    };
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("MySQL database names may consist of only alphanumeric characters and underscores.".to_string());
    }
    if name.len() > 64 {
        return Err("MySQL database names must be 64 characters or less.".to_string());
    }
    Ok(())
}

fn one_of(value: &Value, allowed: &[&str], message: &str) -> Validation {
    match value.as_str() {
        Some(raw) if allowed.contains(&raw) => Ok(()),
        _ => Err(message.to_string()),
    }
}

/// Accepts a port number only if nothing is listening on it locally.
struct PortAvailable;

#[async_trait]
impl Validate for PortAvailable {
    async fn validate(&self, value: &Value) -> Validation {
        let port = validate_port_number(value)?;
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(())
            }
            Err(err) => {
                debug!(port, error = %err, "port check failed");
                Err(format!("Port '{port}' is in use."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_orders_url_before_port() {
        let registry = OptionRegistry::builtin();
        let names: Vec<&str> = registry.validatable().map(|d| d.name).collect();
        let url = names.iter().position(|n| *n == "url").unwrap();
        let port = names.iter().position(|n| *n == "port").unwrap();
        assert!(url < port);
        assert!(!names.contains(&"dbhost"));
        let keys: Vec<&str> = registry.validatable().map(|d| d.key()).collect();
        assert_eq!(keys[url], "url");
        assert_eq!(keys[port], "server.port");
    }

    #[test]
    fn url_requires_http_scheme() {
        assert!(validate_url(&json!("http://localhost:2368")).is_ok());
        assert!(validate_url(&json!("https://my-ghost-blog.com")).is_ok());
        assert!(validate_url(&json!("my-ghost-blog.com")).is_err());
        assert!(validate_url(&json!("ftp://my-ghost-blog.com")).is_err());
        assert!(validate_url(&json!(42)).is_err());
    }

    #[test]
    fn port_number_bounds() {
        assert_eq!(validate_port_number(&json!(2368)), Ok(2368));
        assert_eq!(validate_port_number(&json!("2368")), Ok(2368));
        assert!(validate_port_number(&json!(0)).is_err());
        assert!(validate_port_number(&json!(70000)).is_err());
        assert!(validate_port_number(&json!(23.5)).is_err());
    }

    #[test]
    fn db_name_rules() {
        assert!(validate_db_name(&json!("ghost_prod")).is_ok());
        assert!(validate_db_name(&json!("ghost-prod")).is_err());
        assert!(validate_db_name(&json!("a".repeat(65))).is_err());
        assert!(validate_db_name(&json!("a".repeat(64))).is_ok());
        assert_eq!(
            validate_db_name(&json!("ghöst")),
            Err("MySQL database names may consist of only alphanumeric characters and underscores.".to_string())
        );
        assert_eq!(
            validate_db_name(&json!("b".repeat(65))),
            Err("MySQL database names must be 64 characters or less.".to_string())
        );
    }

    #[test]
    fn enumerations_and_ip() {
        assert!(validate_ip(&json!("127.0.0.1")).is_ok());
        assert!(validate_ip(&json!("::1")).is_ok());
        assert!(validate_ip(&json!("localhost")).is_err());
        assert!(one_of(&json!("local"), &["local", "systemd"], "bad").is_ok());
        assert_eq!(one_of(&json!("pm2"), &["local", "systemd"], "bad"), Err("bad".to_string()));
    }

    #[tokio::test]
    async fn port_in_use_is_rejected() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let result = PortAvailable.validate(&json!(port)).await;
        assert_eq!(result, Err(format!("Port '{port}' is in use.")));
        drop(listener);
    }
}
