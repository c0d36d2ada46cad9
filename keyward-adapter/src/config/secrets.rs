use super::ConfigError;

/// Backend for `${...}` placeholders found in adapter configuration values.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Resolves environment variables and secret files.
///
/// - `${NAME}` and `${env:NAME}` read an environment variable
/// - `${file:/path}` reads a file and trims surrounding whitespace
///
/// `${NAME:default}` falls back to `default` when the variable is unset.
pub struct DefaultSecretResolver;

impl SecretResolver for DefaultSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if let Some(path) = reference.strip_prefix("file:") {
            let path = path.trim();
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::Load(format!("Secret file '{path}': {e}")));
        }

        let var = reference.strip_prefix("env:").unwrap_or(reference);
        let (name, default) = match var.split_once(':') {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (var.trim(), None),
        };
        match (std::env::var(name), default) {
            (Ok(value), _) => Ok(value),
            (Err(_), Some(default)) => Ok(default.to_string()),
            (Err(_), None) => Err(ConfigError::Placeholder(name.to_string())),
        }
    }
}

/// Replace every `${...}` placeholder in `value`.
pub fn resolve_placeholders(
    value: &str,
    resolver: &dyn SecretResolver,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let end = rest[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("Unclosed placeholder in: {value}")))?;
        out.push_str(&rest[..start]);
        out.push_str(&resolver.resolve(&rest[start + 2..start + end])?);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve placeholders in every string scalar of a YAML tree. Mapping keys
/// are left alone.
pub(crate) fn resolve_tree(
    value: &mut serde_yaml::Value,
    resolver: &dyn SecretResolver,
) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::String(s) if s.contains("${") => {
            *s = resolve_placeholders(s, resolver)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                resolve_tree(v, resolver)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq {
                resolve_tree(v, resolver)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapResolver;

    impl SecretResolver for MapResolver {
        fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
            match reference {
                "HOST" => Ok("sso.example.com".into()),
                "PORT" => Ok("8443".into()),
                other => Err(ConfigError::Placeholder(other.into())),
            }
        }
    }

    #[test]
    fn replaces_every_placeholder() {
        let out = resolve_placeholders("https://${HOST}:${PORT}/auth", &MapResolver).unwrap();
        assert_eq!(out, "https://sso.example.com:8443/auth");
    }

    #[test]
    fn plain_value_is_unchanged() {
        assert_eq!(resolve_placeholders("demo", &MapResolver).unwrap(), "demo");
    }

    #[test]
    fn unclosed_placeholder_is_rejected() {
        assert!(matches!(
            resolve_placeholders("${HOST", &MapResolver),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn unknown_reference_is_reported() {
        match resolve_placeholders("${NOPE}", &MapResolver) {
            Err(ConfigError::Placeholder(name)) => assert_eq!(name, "NOPE"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn default_applies_to_unset_variable() {
        let out = DefaultSecretResolver
            .resolve("KEYWARD_TEST_SURELY_UNSET_VAR:fallback")
            .unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn file_reference_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        std::fs::write(&path, "s3cret\n").unwrap();

        let out = resolve_placeholders(&format!("${{file:{}}}", path.display()), &DefaultSecretResolver)
            .unwrap();
        assert_eq!(out, "s3cret");
    }

    #[test]
    fn tree_resolution_skips_non_strings() {
        let mut tree: serde_yaml::Value =
            serde_yaml::from_str("url: https://${HOST}\nport: 8080\nlist: [\"${PORT}\"]").unwrap();
        resolve_tree(&mut tree, &MapResolver).unwrap();
        assert_eq!(tree["url"].as_str(), Some("https://sso.example.com"));
        assert_eq!(tree["port"].as_u64(), Some(8080));
        assert_eq!(tree["list"][0].as_str(), Some("8443"));
    }
}
