use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// One shared cleartext password for the whole deployment. The username and
/// database name in the startup message are free-form (the database name
/// selects the tenant); only the password gates the connection.
#[derive(Debug)]
pub struct ParkdAuthSource {
    password: String,
}

impl ParkdAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for ParkdAuthSource {
    // No salt: the startup handler compares cleartext bytes.
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hands_back_the_configured_secret_unsalted() {
        let source = ParkdAuthSource::new("hunter2".into());
        let login = LoginInfo::new(Some("driver"), Some("garage_east"), "127.0.0.1".into());
        let password = source.get_password(&login).await.unwrap();
        assert_eq!(password.salt(), None);
        assert_eq!(password.password(), b"hunter2");
    }
}
