use super::{FragmentStream, GenerationEngine, GenerationRequest};
use crate::errors::EngineError;
use crate::types::EngineModel;

/// Canned analyst answers used when no real engine is reachable. Selection is
/// keyed off the prompt so the same query always gets the same answer.
const CANNED_ANSWERS: [&str; 5] = [
    "The most common cybersecurity threats include phishing attacks, malware, ransomware, and social engineering. To protect yourself, use strong passwords, enable two-factor authentication, keep software updated, and be cautious of suspicious emails and links.",
    "Zero-day vulnerabilities are security flaws that are unknown to the software vendor and don't have patches available. They're particularly dangerous because attackers can exploit them before developers can create and distribute a fix.",
    "To secure your home network, change default router passwords, use WPA3 encryption if available, create a guest network for visitors, keep firmware updated, and consider using a VPN for additional privacy.",
    "Ransomware is malicious software that encrypts your files and demands payment for the decryption key. The best protection is maintaining regular backups, using security software, keeping systems updated, and training users to recognize phishing attempts.",
    "Multi-factor authentication (MFA) adds an essential layer of security by requiring multiple forms of verification before granting access. Even if your password is compromised, attackers would still need access to your secondary authentication method.",
];

const GREETING: &str =
    "Hello! I'm your cybersecurity assistant. How can I help you with your cybersecurity questions today?";

pub struct MockEngine {
    model: EngineModel,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            model: EngineModel::new("mock"),
        }
    }

    fn respond_to(&self, req: &GenerationRequest) -> String {
        let user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let trimmed = user.trim().to_lowercase();
        if matches!(trimmed.as_str(), "hi" | "hello" | "hey") {
            return GREETING.to_string();
        }

        let idx = user.len() % CANNED_ANSWERS.len();
        CANNED_ANSWERS[idx].to_string()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GenerationEngine for MockEngine {
    async fn generate(&self, req: &GenerationRequest) -> Result<String, EngineError> {
        Ok(self.respond_to(req))
    }

    async fn generate_stream(&self, req: &GenerationRequest) -> Result<FragmentStream, EngineError> {
        let text = self.respond_to(req);
        let fragments: Vec<Result<String, EngineError>> = text
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| {
                let prefix = if i > 0 { " " } else { "" };
                Ok(format!("{prefix}{word}"))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &EngineModel {
        &self.model
    }

    fn validate_config(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
