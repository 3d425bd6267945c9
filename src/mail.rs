use axum::async_trait;
use tracing::info;

/// Template selector for outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Welcome,
    PasswordReset,
}

impl EmailKind {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailKind::Welcome => "Welcome to the Trailbook family!",
            EmailKind::PasswordReset => "Your password reset token (valid for only 10 minutes)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub kind: EmailKind,
    pub to: String,
    pub recipient_name: String,
    /// Link embedded in the mail body (account page or reset URL).
    pub url: String,
}

/// Narrow mail-dispatch interface. Delivery is synchronous from the caller's
/// point of view: callers await the result and decide what a failure means.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Development dispatcher: writes the mail to the log instead of the wire.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: String) -> Self {
        Self { from }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        info!(
            kind = ?email.kind,
            from = %self.from,
            to = %email.to,
            subject = email.kind.subject(),
            url = %email.url,
            "email dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_name_the_template() {
        assert!(EmailKind::Welcome.subject().contains("Welcome"));
        assert!(EmailKind::PasswordReset.subject().contains("10 minutes"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = LogMailer::new("Trailbook <test@trailbook.dev>".into());
        let res = mailer
            .send(OutgoingEmail {
                kind: EmailKind::Welcome,
                to: "new@user.io".into(),
                recipient_name: "New User".into(),
                url: "http://localhost:8080/me".into(),
            })
            .await;
        assert!(res.is_ok());
    }
}
