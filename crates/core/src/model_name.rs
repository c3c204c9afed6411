//! Model-name conversion between the Ollama (`name:version`) and OpenAI
//! (`name/version`) flavors (spec §4.4), grounded on
//! `examples/original_source/ollama_x/types.py`'s `Model.convert_model_name`.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Which wire flavor a [`ModelName`] is currently expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Ollama,
    OpenAi,
}

impl Flavor {
    fn separator(self) -> char {
        match self {
            Flavor::Ollama => ':',
            Flavor::OpenAi => '/',
        }
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<model>[\w.\-]*)([:/](?P<version>[\w.\-]*))?$")
            .expect("model name pattern is valid")
    })
}

/// A parsed `model[:version]` / `model[/version]` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    model: String,
    version: Option<String>,
}

impl ModelName {
    /// Parse a model name in either flavor; the separator (`:` or `/`) only
    /// determines the *source* flavor, the stored value is separator-free.
    pub fn parse(raw: &str) -> Result<Self> {
        let captures = pattern()
            .captures(raw)
            .ok_or_else(|| Error::Validation(format!("invalid model name: {raw}")))?;

        let model = captures
            .name("model")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let version = captures.name("version").map(|m| m.as_str().to_string());

        Ok(Self { model, version })
    }

    /// Render in the requested flavor, e.g. `llama3/latest` for
    /// [`Flavor::OpenAi`].
    pub fn render(&self, flavor: Flavor) -> String {
        match &self.version {
            Some(version) if !version.is_empty() => {
                format!("{}{}{}", self.model, flavor.separator(), version)
            }
            _ => self.model.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Convert from Ollama-flavor text directly to OpenAI-flavor text.
    pub fn ollama_to_openai(raw: &str) -> Result<String> {
        Ok(Self::parse(raw)?.render(Flavor::OpenAi))
    }

    /// Convert from OpenAI-flavor text directly to Ollama-flavor text.
    pub fn openai_to_ollama(raw: &str) -> Result<String> {
        Ok(Self::parse(raw)?.render(Flavor::Ollama))
    }

    /// Does `candidate` (an Ollama-flavor name from a backend's model list,
    /// e.g. `"llama3:latest"`) satisfy a request for `requested`
    /// (e.g. `"llama3"`)? Implements the `^<M>(:<version>)?$` match of
    /// spec §4.2 step 2, with the implicit `:latest` fallback.
    pub fn matches(requested: &str, candidate: &str) -> bool {
        let escaped = regex::escape(requested);
        let re = match Regex::new(&format!(r"^{escaped}(:[\w.\-]*)?$")) {
            Ok(re) => re,
            Err(_) => return false,
        };
        if re.is_match(candidate) {
            return true;
        }
        candidate == format!("{requested}:latest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_between_flavors() {
        for raw in ["a", "a:1", "a.b-c:2"] {
            let ollama = ModelName::parse(raw).unwrap();
            let openai = ollama.render(Flavor::OpenAi);
            let back = ModelName::parse(&openai).unwrap().render(Flavor::Ollama);
            assert_eq!(back, raw);
        }

        let openai = ModelName::parse("a/1").unwrap();
        assert_eq!(openai.render(Flavor::OpenAi), "a/1");
        assert_eq!(openai.render(Flavor::Ollama), "a:1");
    }

    #[test]
    fn unparseable_names_are_validation_errors() {
        assert!(ModelName::parse("a b").is_err());
        assert!(ModelName::parse("a:b:c").is_err());
    }

    #[test]
    fn model_match_regex() {
        assert!(ModelName::matches("llama3", "llama3"));
        assert!(ModelName::matches("llama3", "llama3:latest"));
        assert!(!ModelName::matches("llama3", "llama3-vision"));
    }
}
