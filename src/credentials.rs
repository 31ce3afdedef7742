//! Credential sources and their priority-ordered resolution
//!
//! Sources are probed in order (environment, secrets file, config.yml,
//! interactive prompt); the first one producing a complete set wins.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::client::SessionToken;
use crate::config::{expand_placeholder, TelegramConfig};
use crate::error::{Error, Result};

pub const ENV_API_ID: &str = "TELEGRAM_API_ID";
pub const ENV_API_HASH: &str = "TELEGRAM_API_HASH";
pub const ENV_SESSION: &str = "TELEGRAM_SESSION";
pub const ENV_PHONE: &str = "TELEGRAM_PHONE";

/// A validated credential set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
    pub session: SessionToken,
    pub phone: Option<String>,
}

/// Raw, possibly incomplete values read from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialCredentials {
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub session: Option<String>,
    pub phone: Option<String>,
}

impl PartialCredentials {
    fn set(&mut self, key: &str, value: String) {
        // First occurrence of each key wins.
        let slot = match key {
            ENV_API_ID => &mut self.api_id,
            ENV_API_HASH => &mut self.api_hash,
            ENV_SESSION => &mut self.session,
            ENV_PHONE => &mut self.phone,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn parsed_api_id(&self) -> Option<i32> {
        self.api_id
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
    }

    fn api_hash(&self) -> Option<&str> {
        self.api_hash
            .as_deref()
            .map(str::trim)
            .filter(|hash| !hash.is_empty())
    }

    /// Field names this source could not supply in usable form.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.parsed_api_id().is_none() {
            missing.push("api_id");
        }
        if self.api_hash().is_none() {
            missing.push("api_hash");
        }
        missing
    }

    /// Complete only with a positive api_id and a non-empty api_hash.
    pub fn into_credentials(self) -> Option<Credentials> {
        let api_id = self.parsed_api_id()?;
        let api_hash = self.api_hash()?.to_string();
        Some(Credentials {
            api_id,
            api_hash,
            session: self.session.map(SessionToken::new).unwrap_or_default(),
            phone: self
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        })
    }
}

/// One place credentials may come from.
pub trait CredentialSource {
    fn name(&self) -> &str;

    /// Whatever this source knows; `None` when it is unavailable altogether.
    fn read(&mut self) -> Result<Option<PartialCredentials>>;
}

/// Process environment (`TELEGRAM_*` variables).
pub struct EnvSource {
    lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn read(&mut self) -> Result<Option<PartialCredentials>> {
        let mut partial = PartialCredentials::default();
        for key in [ENV_API_ID, ENV_API_HASH, ENV_SESSION, ENV_PHONE] {
            if let Some(value) = (self.lookup)(key) {
                partial.set(key, value);
            }
        }
        Ok(Some(partial))
    }
}

/// Line-oriented `KEY=VALUE` secrets file.
///
/// Malformed and unrecognized lines are skipped. The process environment is
/// not modified.
pub struct SecretsFileSource {
    path: PathBuf,
}

impl SecretsFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for SecretsFileSource {
    fn name(&self) -> &str {
        "secrets file"
    }

    fn read(&mut self) -> Result<Option<PartialCredentials>> {
        let iter = match dotenvy::from_path_iter(&self.path) {
            Ok(iter) => iter,
            Err(err) => {
                debug!("Secrets file {} unavailable: {}", self.path.display(), err);
                return Ok(None);
            }
        };

        let mut partial = PartialCredentials::default();
        for (key, value) in iter.filter_map(|item| item.ok()) {
            partial.set(&key, value);
        }
        Ok(Some(partial))
    }
}

/// The `telegram:` section of config.yml.
pub struct ConfigFileSource {
    telegram: TelegramConfig,
}

impl ConfigFileSource {
    pub fn new(telegram: TelegramConfig) -> Self {
        Self { telegram }
    }
}

impl CredentialSource for ConfigFileSource {
    fn name(&self) -> &str {
        "config.yml"
    }

    fn read(&mut self) -> Result<Option<PartialCredentials>> {
        let t = &self.telegram;
        Ok(Some(PartialCredentials {
            api_id: expand_placeholder(t.api_id.as_deref()),
            api_hash: expand_placeholder(t.api_hash.as_deref()),
            session: expand_placeholder(t.session.as_deref()),
            phone: expand_placeholder(t.phone.as_deref()),
        }))
    }
}

/// Interactive prompt, the lowest-priority source.
pub struct PromptSource<R, W> {
    input: R,
    output: W,
}

impl PromptSource<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> CredentialSource for PromptSource<R, W> {
    fn name(&self) -> &str {
        "prompt"
    }

    fn read(&mut self) -> Result<Option<PartialCredentials>> {
        writeln!(self.output, "Credentials not found. Please enter the values:")?;
        let api_id = ask_line(&mut self.input, &mut self.output, "Enter your API ID: ")?;
        let api_hash = ask_line(&mut self.input, &mut self.output, "Enter your API HASH: ")?;
        let session = ask_line(
            &mut self.input,
            &mut self.output,
            "Enter your SESSION string (blank for a new login): ",
        )?;

        let phone = match session.as_deref() {
            Some(s) if !s.is_empty() => None,
            _ => ask_line(
                &mut self.input,
                &mut self.output,
                "Enter your phone number (e.g., +1234567890): ",
            )?,
        };

        Ok(Some(PartialCredentials {
            api_id,
            api_hash,
            session,
            phone,
        }))
    }
}

/// Print `prompt` and read one trimmed line; `None` on end of input.
pub fn ask_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Probes sources in priority order.
pub struct CredentialResolver {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialResolver {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Environment, secrets file, config.yml and optionally the prompt.
    pub fn standard(
        secrets_file: impl Into<PathBuf>,
        telegram: TelegramConfig,
        interactive: bool,
    ) -> Self {
        let mut sources: Vec<Box<dyn CredentialSource>> = vec![
            Box::new(EnvSource::new()),
            Box::new(SecretsFileSource::new(secrets_file)),
            Box::new(ConfigFileSource::new(telegram)),
        ];
        if interactive {
            sources.push(Box::new(PromptSource::stdin()));
        }
        Self::new(sources)
    }

    pub fn resolve(&mut self) -> Result<Credentials> {
        // Fields no source managed to supply.
        let mut missing: BTreeSet<&'static str> = ["api_id", "api_hash"].into_iter().collect();

        for source in self.sources.iter_mut() {
            let Some(partial) = source.read()? else {
                continue;
            };
            let absent = partial.missing_fields();
            missing.retain(|field| absent.contains(field));

            if let Some(credentials) = partial.into_credentials() {
                info!(
                    "Using credentials from {} (session: {})",
                    source.name(),
                    if credentials.session.is_empty() { "new login" } else { "reuse" }
                );
                return Ok(credentials);
            }
            debug!("Source {} incomplete, missing {:?}", source.name(), absent);
        }

        if missing.is_empty() {
            // Each field came from some source, but never together.
            missing.extend(["api_id", "api_hash"]);
        }
        Err(Error::missing_credentials(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn env_from(pairs: &[(&str, &str)]) -> EnvSource {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::with_lookup(move |key| map.get(key).cloned())
    }

    fn secrets_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write secrets");
        file
    }

    #[test]
    fn env_source_reads_all_keys() {
        let mut source = env_from(&[
            (ENV_API_ID, "12345"),
            (ENV_API_HASH, "abc"),
            (ENV_SESSION, "token"),
            (ENV_PHONE, "+10000000000"),
        ]);
        let creds = source.read().unwrap().unwrap().into_credentials().unwrap();
        assert_eq!(creds.api_id, 12345);
        assert_eq!(creds.api_hash, "abc");
        assert_eq!(creds.session.as_str(), "token");
        assert_eq!(creds.phone.as_deref(), Some("+10000000000"));
    }

    #[test]
    fn session_is_optional() {
        let mut source = env_from(&[(ENV_API_ID, "12345"), (ENV_API_HASH, "abc")]);
        let creds = source.read().unwrap().unwrap().into_credentials().unwrap();
        assert!(creds.session.is_empty());
        assert!(creds.phone.is_none());
    }

    #[test]
    fn non_positive_or_garbage_api_id_is_incomplete() {
        for raw in ["0", "-5", "abc", ""] {
            let partial = PartialCredentials {
                api_id: Some(raw.into()),
                api_hash: Some("abc".into()),
                ..Default::default()
            };
            assert_eq!(partial.missing_fields(), vec!["api_id"], "api_id {:?}", raw);
            assert!(partial.into_credentials().is_none());
        }
    }

    #[test]
    fn session_alone_is_insufficient() {
        let partial = PartialCredentials {
            session: Some("token".into()),
            ..Default::default()
        };
        assert_eq!(partial.missing_fields(), vec!["api_id", "api_hash"]);
        assert!(partial.into_credentials().is_none());
    }

    #[test]
    fn secrets_file_first_occurrence_wins_and_junk_ignored() {
        let file = secrets_file(
            "# comment\nTELEGRAM_API_ID=111\nnot a pair\nOTHER=1\nTELEGRAM_API_HASH=\"quoted\"\nTELEGRAM_API_ID=222\n",
        );
        let mut source = SecretsFileSource::new(file.path());
        let partial = source.read().unwrap().unwrap();
        assert_eq!(partial.api_id.as_deref(), Some("111"));
        assert_eq!(partial.api_hash.as_deref(), Some("quoted"));
        assert!(partial.session.is_none());
    }

    #[test]
    fn missing_secrets_file_is_absent() {
        let mut source = SecretsFileSource::new("/nonexistent/tg_diag/.env");
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn config_source_uses_plain_values() {
        let mut source = ConfigFileSource::new(TelegramConfig {
            api_id: Some("54321".into()),
            api_hash: Some("yaml_hash".into()),
            phone: None,
            session: None,
        });
        let creds = source.read().unwrap().unwrap().into_credentials().unwrap();
        assert_eq!(creds.api_id, 54321);
        assert_eq!(creds.api_hash, "yaml_hash");
    }

    #[test]
    fn prompt_source_asks_phone_only_without_session() {
        let input = Cursor::new("12345\nabc\n\n+10000000000\n");
        let mut output = Vec::new();
        let mut source = PromptSource::new(input, &mut output);
        let creds = source.read().unwrap().unwrap().into_credentials().unwrap();
        assert_eq!(creds.api_id, 12345);
        assert!(creds.session.is_empty());
        assert_eq!(creds.phone.as_deref(), Some("+10000000000"));
        drop(source);
        assert!(String::from_utf8(output).unwrap().contains("phone number"));

        let input = Cursor::new("12345\nabc\nsaved_token\n");
        let mut source = PromptSource::new(input, Vec::new());
        let creds = source.read().unwrap().unwrap().into_credentials().unwrap();
        assert_eq!(creds.session.as_str(), "saved_token");
        assert!(creds.phone.is_none());
    }

    #[test]
    fn prompt_source_handles_closed_input() {
        let mut source = PromptSource::new(Cursor::new(""), Vec::new());
        let partial = source.read().unwrap().unwrap();
        assert!(partial.into_credentials().is_none());
    }

    #[test]
    fn environment_beats_secrets_file() {
        let file = secrets_file("TELEGRAM_API_ID=999\nTELEGRAM_API_HASH=file_hash\n");
        let mut resolver = CredentialResolver::new(vec![
            Box::new(env_from(&[(ENV_API_ID, "12345"), (ENV_API_HASH, "env_hash")])),
            Box::new(SecretsFileSource::new(file.path())),
        ]);
        let creds = resolver.resolve().unwrap();
        assert_eq!(creds.api_id, 12345);
        assert_eq!(creds.api_hash, "env_hash");
    }

    #[test]
    fn falls_through_to_secrets_file() {
        let file = secrets_file("TELEGRAM_API_ID=999\nTELEGRAM_API_HASH=file_hash\nTELEGRAM_SESSION=s\n");
        let mut resolver = CredentialResolver::new(vec![
            Box::new(env_from(&[(ENV_API_HASH, "env_hash_only")])),
            Box::new(SecretsFileSource::new(file.path())),
        ]);
        let creds = resolver.resolve().unwrap();
        assert_eq!(creds.api_id, 999);
        assert_eq!(creds.api_hash, "file_hash");
        assert_eq!(creds.session.as_str(), "s");
    }

    #[test]
    fn missing_credentials_names_absent_fields() {
        let mut resolver = CredentialResolver::new(vec![
            Box::new(env_from(&[(ENV_API_ID, "12345")])),
            Box::new(SecretsFileSource::new("/nonexistent/tg_diag/.env")),
        ]);
        match resolver.resolve() {
            Err(Error::MissingCredentials { missing }) => assert_eq!(missing, vec!["api_hash"]),
            other => panic!("expected MissingCredentials, got {:?}", other),
        }
    }

    #[test]
    fn missing_credentials_with_no_sources() {
        let mut resolver = CredentialResolver::new(Vec::new());
        match resolver.resolve() {
            Err(Error::MissingCredentials { missing }) => {
                assert_eq!(missing, vec!["api_hash", "api_id"])
            }
            other => panic!("expected MissingCredentials, got {:?}", other),
        }
    }
}
