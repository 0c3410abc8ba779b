// mailer.rs
// Outbound email. Delivery is best-effort; callers log failures and move on.

use anyhow::{Context, Result};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use tracing::{debug, info};

use crate::config::SmtpConfig;

#[derive(Clone)]
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: String,
    },
    Disabled,
}

impl Mailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self> {
        let Some(smtp) = smtp else {
            return Ok(Mailer::Disabled);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .with_context(|| format!("invalid SMTP relay {}", smtp.host))?
            .port(smtp.port);
        if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
        Ok(Mailer::Smtp {
            transport: builder.build(),
            from: smtp.from.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Mailer::Smtp { .. })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        match self {
            Mailer::Disabled => {
                debug!(to, subject, "email disabled, message dropped");
                Ok(())
            }
            Mailer::Smtp { transport, from } => {
                let message = Message::builder()
                    .from(from.parse().context("invalid sender address")?)
                    .to(to.parse().context("invalid recipient address")?)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(body.to_string())
                    .context("building email")?;
                transport.send(message).await.context("sending email")?;
                Ok(())
            }
        }
    }
}
