pub mod notify;
pub mod parser;
pub mod processor;
pub mod rate_limit;
pub mod validator;

pub use notify::{LogNotifier, Notifier};
pub use parser::{EmailParseError, Mailbox, ParsedEmail, parse_raw_email};
pub use processor::{EmailProcessor, InboundEmail, ProcessingResult};
pub use rate_limit::{DomainRateLimiter, RateLimitDecision, RateLimitPolicy, SenderRateLimiter};
pub use validator::{
    CheckResult, EmailValidator, RiskLevel, Score, ValidationChecks, ValidationVerdict,
    score_checks,
};
