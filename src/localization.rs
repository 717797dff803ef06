use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::Arc;
use unic_langid::LanguageIdentifier;

const DEFAULT_LANGUAGE: &str = "en";

const LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("fr", include_str!("../locales/fr/main.ftl")),
];

/// Localization manager for bot replies
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl std::fmt::Debug for LocalizationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizationManager")
            .field("languages", &self.bundles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalizationManager {
    /// Create a new localization manager from the embedded locale files
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (locale_str, source) in LOCALES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            let bundle = Self::create_bundle(locale, source)?;
            bundles.insert(locale_str.to_string(), bundle);
        }

        Ok(Self { bundles })
    }

    fn create_bundle(
        locale: LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the Unicode isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid FTL for {}: {:?}", locale, errors))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate FTL messages for {}: {:?}", locale, errors))?;

        Ok(bundle)
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&FluentArgs>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => return format!("Missing translation: {}", key),
        };

        let mut errors = vec![];
        bundle
            .format_pattern(pattern, args, &mut errors)
            .into_owned()
    }

    /// Message for the user's Telegram language code
    pub fn t(&self, key: &str, language_code: Option<&str>) -> String {
        self.get_message_in_language(key, &self.detect_language(language_code), None)
    }

    /// Message with `{ $name }` arguments for the user's Telegram language code
    pub fn t_args(
        &self,
        key: &str,
        args: &[(&str, String)],
        language_code: Option<&str>,
    ) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(value.clone()));
        }
        self.get_message_in_language(key, &self.detect_language(language_code), Some(&fluent_args))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Map a Telegram language code ("fr-FR", "en") to a supported language
    pub fn detect_language(&self, language_code: Option<&str>) -> String {
        language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(|lang| lang.to_lowercase())
            .filter(|lang| self.is_language_supported(lang))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }
}

/// Create the shared localization manager
pub fn create_localization_manager() -> Result<Arc<LocalizationManager>> {
    Ok(Arc::new(LocalizationManager::new()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(manager.detect_language(Some("fr-FR")), "fr");
        assert_eq!(manager.detect_language(Some("en")), "en");
        assert_eq!(manager.detect_language(Some("de")), "en");
        assert_eq!(manager.detect_language(None), "en");
    }

    #[test]
    fn test_arguments_are_interpolated_without_isolation_marks() {
        let manager = LocalizationManager::new().unwrap();
        let text = manager.t_args("file-stored", &[("id", "42".to_string())], None);
        assert!(text.contains("42"));
        assert!(!text.contains('\u{2068}'));
    }

    #[test]
    fn test_every_english_key_exists_in_french() {
        let manager = LocalizationManager::new().unwrap();
        let en = &manager.bundles["en"];
        let fr = &manager.bundles["fr"];
        for line in LOCALES[0].1.lines() {
            if let Some((key, _)) = line.split_once(" =") {
                if !key.starts_with(' ') && !key.starts_with('#') && !key.is_empty() {
                    assert!(en.has_message(key), "en missing {}", key);
                    assert!(fr.has_message(key), "fr missing {}", key);
                }
            }
        }
    }

    #[test]
    fn test_missing_key_is_reported() {
        let manager = LocalizationManager::new().unwrap();
        assert_eq!(manager.t("no-such-key", None), "Missing translation: no-such-key");
    }
}
