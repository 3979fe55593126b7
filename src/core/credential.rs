//! Password credential and output redaction.
//!
//! The password lives in one `Zeroizing` buffer owned by `Credential` and is
//! wiped when the credential drops. sshpass reads it from a pipe, `sudo -S`
//! from stdin, and the `Redactor` borrows it rather than keeping a copy.

use std::fmt;

use serde_json::Value;
use zeroize::Zeroizing;

pub struct Credential {
    secret: Zeroizing<String>,
}

impl Credential {
    pub fn new(secret: String) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Borrow the secret. Callers must not copy it into long-lived storage.
    pub fn expose(&self) -> &str {
        self.secret.as_str()
    }

    /// Secret followed by a newline, as `sudo -S` and `sshpass -d` read it.
    /// Sized up front so the buffer never reallocates and leaves a copy.
    pub fn stdin_line(&self) -> Zeroizing<Vec<u8>> {
        let mut line = Zeroizing::new(Vec::with_capacity(self.secret.len() + 1));
        line.extend_from_slice(self.secret.as_bytes());
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Masks secret values in text destined for operators.
#[derive(Default)]
pub struct Redactor<'a> {
    secret: Option<&'a Credential>,
    needles: Vec<(Zeroizing<String>, &'static str)>,
}

/// Identifying values shorter than this are left unmasked.
const MIN_MASKED_LEN: usize = 3;

impl<'a> Redactor<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask every occurrence of the credential, whatever its length.
    pub fn secret(mut self, credential: &'a Credential) -> Self {
        if !credential.is_empty() {
            self.secret = Some(credential);
        }
        self
    }

    /// Mask an identifying value such as a host name or remote path.
    pub fn value(mut self, value: &str, label: &'static str) -> Self {
        let value = value.trim();
        if value.len() >= MIN_MASKED_LEN {
            self.needles
                .push((Zeroizing::new(value.to_string()), label));
        }
        self
    }

    pub fn redact(&self, text: &str) -> String {
        let mut needles: Vec<(&str, &'static str)> = self
            .needles
            .iter()
            .map(|(needle, label)| (needle.as_str(), *label))
            .chain(self.secret.map(|credential| (credential.expose(), "***")))
            .collect();
        // Longest first so a path containing the host is masked whole.
        needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut redacted = text.to_string();
        for (needle, label) in needles {
            if redacted.contains(needle) {
                redacted = redacted.replace(needle, label);
            }
        }
        redacted
    }

    /// Redact every string inside a JSON value.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Redactor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redactor")
            .field("secret", &self.secret.is_some())
            .field("needles", &self.needles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_secret() {
        let credential = Credential::new("hunter2".to_string());
        assert_eq!(format!("{:?}", credential), "Credential(***)");
    }

    #[test]
    fn stdin_line_appends_newline() {
        let credential = Credential::new("pw".to_string());
        assert_eq!(credential.stdin_line().as_slice(), b"pw\n");
    }

    #[test]
    fn stdin_line_never_outgrows_its_buffer() {
        let credential = Credential::new("correct-horse-battery".to_string());
        let line = credential.stdin_line();
        assert_eq!(line.capacity(), line.len());
    }

    #[test]
    fn redactor_borrows_the_credential_instead_of_copying_it() {
        let credential = Credential::new("s3cr3t".to_string());
        let redactor = Redactor::new().secret(&credential).value("/srv/bot", "<path>");

        let secret = redactor.secret.map(|c| c.expose().as_ptr());
        assert_eq!(secret, Some(credential.expose().as_ptr()));
        assert!(redactor
            .needles
            .iter()
            .all(|(needle, _)| needle.as_str() != "s3cr3t"));
        assert_eq!(redactor.redact("s3cr3t@/srv/bot"), "***@<path>");
    }

    #[test]
    fn redact_masks_secret_and_identifying_values() {
        let credential = Credential::new("s3cr3t".to_string());
        let redactor = Redactor::new()
            .secret(&credential)
            .value("bot.example.com", "<host>")
            .value("/home/pi/bot", "<path>");

        let text = "mv: cannot stat '/home/pi/bot/main.py' on bot.example.com (pw s3cr3t)";
        assert_eq!(
            redactor.redact(text),
            "mv: cannot stat '<path>/main.py' on <host> (pw ***)"
        );
    }

    #[test]
    fn short_identifying_values_are_not_masked() {
        let redactor = Redactor::new().value("pi", "<user>");
        assert_eq!(redactor.redact("pipeline"), "pipeline");
    }

    #[test]
    fn short_passwords_are_still_masked() {
        let credential = Credential::new("ab".to_string());
        let redactor = Redactor::new().secret(&credential);
        assert_eq!(redactor.redact("xaby"), "x***y");
    }

    #[test]
    fn redact_value_walks_nested_json() {
        let credential = Credential::new("s3cr3t".to_string());
        let redactor = Redactor::new().secret(&credential);
        let value = serde_json::json!({
            "stderr": "bad s3cr3t",
            "lines": ["s3cr3t", 3],
            "nested": { "stdout": "ok" }
        });

        let redacted = redactor.redact_value(&value);
        assert_eq!(redacted["stderr"], "bad ***");
        assert_eq!(redacted["lines"][0], "***");
        assert_eq!(redacted["lines"][1], 3);
        assert_eq!(redacted["nested"]["stdout"], "ok");
    }
}
