use crate::config::SmtpConfig;
use crate::error::EmailError;
use crate::workflows::{Mailer, OutgoingEmail};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, EmailError> {
        let from = format!("{} <{}>", smtp_config.from_name, smtp_config.from_email);
        from.parse::<Mailbox>()?;

        if !smtp_config.is_configured() {
            warn!("SMTP is not configured; workflow emails will fail as undeliverable");
            return Ok(Self {
                transport: None,
                from,
            });
        }

        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self {
            transport: Some(transport),
            from,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        let message = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(email.to.parse::<Mailbox>()?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())?;

        Ok(message)
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = self.build_message(email)?;

        let Some(transport) = &self.transport else {
            return Err(EmailError::Unavailable("SMTP is not configured".to_string()));
        };

        match transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", email.to);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to, e);
                Err(e.into())
            }
        }
    }
}
