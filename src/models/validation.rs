use crate::error::{PipelineError, PipelineResult};

pub fn validate_email_address(address: &str) -> PipelineResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(invalid("Recipient email cannot be empty"));
    }

    if address.len() > 254 {
        return Err(invalid("Recipient email too long (maximum 254 characters)"));
    }

    let Some((local, domain)) = address.split_once('@') else {
        return Err(invalid("Recipient email must contain '@'"));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid("Recipient email is malformed"));
    }

    if address.chars().any(char::is_whitespace) {
        return Err(invalid("Recipient email contains whitespace"));
    }

    Ok(())
}

pub fn validate_phone_number(number: &str) -> PipelineResult<()> {
    let digits = number.strip_prefix('+').unwrap_or(number);

    if digits.is_empty() {
        return Err(invalid("Recipient phone number cannot be empty"));
    }

    let valid_chars = digits
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-');

    if !valid_chars {
        return Err(invalid("Recipient phone number contains invalid characters"));
    }

    let digit_count = digits.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digit_count) {
        return Err(invalid("Recipient phone number must have 7 to 15 digits"));
    }

    Ok(())
}

/// A message carries either literal content or a template name, never both.
pub fn validate_body_source(body: &str, template: Option<&str>) -> PipelineResult<()> {
    let has_body = !body.trim().is_empty();
    let has_template = template.is_some_and(|t| !t.trim().is_empty());

    match (has_body, has_template) {
        (true, false) | (false, true) => Ok(()),
        (true, true) => Err(invalid("Message sets both a literal body and a template")),
        (false, false) => Err(invalid("Message has neither a body nor a template")),
    }
}

fn invalid(reason: &str) -> PipelineError {
    PipelineError::InvalidNotification(reason.to_string())
}
