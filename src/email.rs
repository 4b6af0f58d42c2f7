//! System email service for sending password recovery emails.
//!
//! Uses the SMTP configuration from the main config file. When SMTP is not
//! configured the service logs a warning and drops the message, so local
//! setups work without a mail server.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Service for sending system emails
pub struct MailService {
    config: EmailConfig,
}

impl MailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send a password recovery email with the reset link
    pub async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping password reset email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = "Recuperação de senha";
        let html_body = render_reset_html(reset_url);
        let text_body = render_reset_text(reset_url);

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
            .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");

        Ok(())
    }
}

fn render_reset_html(reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Recuperação de senha</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0, 0, 0, 0.06);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #3b82f6 0%, #2563eb 100%);
            color: white;
            padding: 32px 24px;
            text-align: center;
        }}
        .body {{
            padding: 32px 24px;
            color: #374151;
            line-height: 1.6;
        }}
        .button {{
            display: inline-block;
            background-color: #2563eb;
            color: #ffffff !important;
            padding: 12px 28px;
            border-radius: 6px;
            text-decoration: none;
            font-weight: 600;
        }}
        .footer {{
            padding: 20px 24px;
            color: #9ca3af;
            font-size: 13px;
            text-align: center;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <div class="header">
                <h1>Recuperação de senha</h1>
            </div>
            <div class="body">
                <p>Recebemos uma solicitação para redefinir a sua senha.</p>
                <p>Clique no botão abaixo para escolher uma nova senha. O link expira em 1 hora.</p>
                <p style="text-align: center; margin: 28px 0;">
                    <a class="button" href="{reset_url}">Redefinir senha</a>
                </p>
                <p>Se você não solicitou a redefinição, ignore este email.</p>
            </div>
            <div class="footer">
                Este é um email automático. Não responda a esta mensagem.
            </div>
        </div>
    </div>
</body>
</html>"#
    )
}

fn render_reset_text(reset_url: &str) -> String {
    format!(
        "Recuperação de senha\n\n\
         Recebemos uma solicitação para redefinir a sua senha.\n\
         Acesse o link abaixo para escolher uma nova senha. O link expira em 1 hora.\n\n\
         {reset_url}\n\n\
         Se você não solicitou a redefinição, ignore este email.\n"
    )
}
