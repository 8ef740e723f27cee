//! Outbound email for the budgeting application.
//!
//! The [MailTransport] trait hides how email leaves the application so that
//! the notification code can be exercised without a mail server. [LogMail]
//! writes messages to the log and [MemoryMail] records them for tests.

use std::{
    fmt::{self, Display},
    sync::Mutex,
};

use async_trait::async_trait;
use time::Date;

use crate::{
    Error, budget::SpendingAlertLevel, currency::format_amount, email::Email,
    transaction::Transaction, user::User,
};

/// The kinds of email the application sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailKind {
    /// Sent when an account is created.
    Welcome,
    /// Sent when a debit uses a large share of the remaining budget.
    SpendingAlert,
    /// Sent when the remaining budget drops below a fifth of the monthly budget.
    LowBalance,
    /// Sent when an autopay template is due within the next few days.
    AutopayUpcoming,
}

impl Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmailKind::Welcome => "welcome",
            EmailKind::SpendingAlert => "spending alert",
            EmailKind::LowBalance => "low balance",
            EmailKind::AutopayUpcoming => "autopay reminder",
        };

        f.write_str(name)
    }
}

/// An email ready to hand to a [MailTransport].
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    /// The kind of email.
    pub kind: EmailKind,
    /// The recipient's address.
    pub to: Email,
    /// The subject line.
    pub subject: String,
    /// The plain text body.
    pub body: String,
}

impl MailMessage {
    /// Create an email from its parts.
    pub fn new(kind: EmailKind, to: Email, subject: &str, body: &str) -> Self {
        Self {
            kind,
            to,
            subject: subject.to_owned(),
            body: body.to_owned(),
        }
    }

    /// The email sent to a user when their account is created.
    pub fn welcome(user: &User) -> Self {
        let body = format!(
            "Hi {},\n\n\
             Welcome to Spendeur! Record your income and expenses to see where your \
             money goes, set a monthly budget, and let autopay take care of your \
             recurring bills.\n\n\
             Happy budgeting!",
            user.full_name
        );

        Self::new(EmailKind::Welcome, user.email.clone(), "Welcome to Spendeur", &body)
    }

    /// The email sent when a debit uses a large share of the remaining budget.
    pub fn spending_alert(
        user: &User,
        level: SpendingAlertLevel,
        transaction: &Transaction,
        percentage: f64,
    ) -> Self {
        let body = format!(
            "Hi {},\n\n\
             Your spending of {} on {} used {percentage:.1}% of your remaining \
             monthly budget. Review your recent transactions to stay on track.",
            user.full_name,
            format_amount(transaction.amount),
            transaction.label
        );

        Self::new(EmailKind::SpendingAlert, user.email.clone(), level.title(), &body)
    }

    /// The email sent when the remaining budget drops below a fifth of the
    /// monthly budget.
    pub fn low_balance(user: &User, remaining: f64, budget: f64) -> Self {
        let body = format!(
            "Hi {},\n\n\
             Your remaining budget for this month is {}. That is less than 20% of \
             your {} monthly budget. Consider slowing down your spending for the \
             rest of the month.",
            user.full_name,
            format_amount(remaining),
            format_amount(budget)
        );

        Self::new(
            EmailKind::LowBalance,
            user.email.clone(),
            "Low Monthly Balance Alert",
            &body,
        )
    }

    /// The email sent when an autopay template is due within the next few days.
    pub fn autopay_upcoming(user: &User, template: &Transaction, next_due: Date) -> Self {
        let body = format!(
            "Hi {},\n\n\
             {} will be automatically {} for {} on {next_due}.",
            user.full_name,
            format_amount(template.amount),
            template.kind.verb(),
            template.label
        );

        Self::new(
            EmailKind::AutopayUpcoming,
            user.email.clone(),
            "Upcoming Autopay Reminder",
            &body,
        )
    }
}

/// Delivers email on behalf of the application.
///
/// Implementations must not block the async runtime.
#[async_trait]
pub trait MailTransport: Send + Sync + fmt::Debug {
    /// Deliver `message` to its recipient.
    ///
    /// # Errors
    /// Returns a [Error::EmailDeliveryError] if the message could not be
    /// handed off for delivery.
    async fn send(&self, message: &MailMessage) -> Result<(), Error>;
}

/// A transport that writes email to the application log instead of sending it.
///
/// This is the default transport so that deployments without a mail server
/// still surface every message.
#[derive(Debug, Default)]
pub struct LogMail;

#[async_trait]
impl MailTransport for LogMail {
    async fn send(&self, message: &MailMessage) -> Result<(), Error> {
        tracing::info!(
            "Sending {} email to {}: {}",
            message.kind,
            message.to,
            message.subject
        );
        tracing::debug!("{}", message.body);

        Ok(())
    }
}

/// A transport that records email in memory so tests can assert on it.
#[derive(Debug, Default)]
pub struct MemoryMail {
    messages: Mutex<Vec<MailMessage>>,
}

impl MemoryMail {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.messages
            .lock()
            .expect("Could not acquire the sent messages lock")
            .clone()
    }
}

#[async_trait]
impl MailTransport for MemoryMail {
    async fn send(&self, message: &MailMessage) -> Result<(), Error> {
        self.messages
            .lock()
            .map_err(|_| Error::EmailDeliveryError("the sent messages lock was poisoned".to_owned()))?
            .push(message.clone());

        Ok(())
    }
}
