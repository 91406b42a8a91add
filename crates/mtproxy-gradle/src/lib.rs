//! Rewrites `gradle.properties` so Gradle's own HTTP(S) client routes
//! through the proxy and trusts its CA via a Java truststore. Grounded in
//! `gradle_handler.py`'s `set_gradle_proxies`/`clear_gradle_proxies`: other
//! keys in the file are preserved verbatim, line order is kept, and managed
//! keys already present are overwritten in place rather than duplicated.

mod errors;

use std::path::Path;

pub use errors::{GradleError, Result};

const MANAGED_KEYS: &[&str] = &[
    "systemProp.http.proxyHost",
    "systemProp.http.proxyPort",
    "systemProp.https.proxyHost",
    "systemProp.https.proxyPort",
    "systemProp.javax.net.ssl.trustStore",
    "systemProp.javax.net.ssl.trustStorePassword",
    "systemProp.javax.net.ssl.trustStoreType",
];

fn line_key(line: &str) -> &str {
    line.split('=').next().unwrap_or("").trim()
}

/// Sets the proxy host/port and truststore properties, preserving every
/// other line in the file untouched.
pub fn set_gradle_proxies(
    path: &Path,
    proxy_host: &str,
    proxy_port: u16,
    truststore_path: &str,
    truststore_password: &str,
) -> Result<()> {
    let mut pending: Vec<(&str, String)> = vec![
        ("systemProp.http.proxyHost", proxy_host.to_string()),
        ("systemProp.http.proxyPort", proxy_port.to_string()),
        ("systemProp.https.proxyHost", proxy_host.to_string()),
        ("systemProp.https.proxyPort", proxy_port.to_string()),
        ("systemProp.javax.net.ssl.trustStore", truststore_path.to_string()),
        (
            "systemProp.javax.net.ssl.trustStorePassword",
            truststore_password.to_string(),
        ),
        ("systemProp.javax.net.ssl.trustStoreType", "JKS".to_string()),
    ];

    let existing = read_lines(path)?;
    let mut updated = Vec::with_capacity(existing.len() + pending.len());

    for line in existing {
        let key = line_key(&line).to_string();
        if let Some(idx) = pending.iter().position(|(k, _)| *k == key) {
            let (k, v) = pending.remove(idx);
            updated.push(format!("{k}={v}\n"));
        } else {
            updated.push(line);
        }
    }

    for (key, value) in pending {
        updated.push(format!("{key}={value}\n"));
    }

    write_lines(path, &updated)?;
    tracing::info!(path = %path.display(), "gradle proxies and truststore set");
    Ok(())
}

/// Removes every managed key, preserving all other lines untouched.
pub fn clear_gradle_proxies(path: &Path) -> Result<()> {
    let existing = read_lines(path)?;
    let updated: Vec<String> = existing
        .into_iter()
        .filter(|line| !MANAGED_KEYS.contains(&line_key(line)))
        .collect();

    write_lines(path, &updated)?;
    tracing::info!(path = %path.display(), "gradle proxies and truststore cleared");
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|source| GradleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text.lines().map(|l| format!("{l}\n")).collect())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| GradleError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, lines.concat()).map_err(|source| GradleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sets_proxies_on_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradle.properties");
        set_gradle_proxies(&path, "127.0.0.1", 27579, "/tmp/truststore.jks", "changeit").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("systemProp.http.proxyHost=127.0.0.1"));
        assert!(text.contains("systemProp.https.proxyPort=27579"));
        assert!(text.contains("systemProp.javax.net.ssl.trustStoreType=JKS"));
    }

    #[test]
    fn preserves_unrelated_lines_and_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradle.properties");
        std::fs::write(
            &path,
            "org.gradle.jvmargs=-Xmx2g\nsystemProp.http.proxyHost=old-host\n",
        )
        .unwrap();

        set_gradle_proxies(&path, "127.0.0.1", 27579, "/tmp/truststore.jks", "changeit").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "org.gradle.jvmargs=-Xmx2g");
        assert_eq!(lines[1], "systemProp.http.proxyHost=127.0.0.1");
    }

    #[test]
    fn clear_removes_only_managed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradle.properties");
        set_gradle_proxies(&path, "127.0.0.1", 27579, "/tmp/truststore.jks", "changeit").unwrap();
        std::fs::write(
            &path,
            format!(
                "org.gradle.jvmargs=-Xmx2g\n{}",
                std::fs::read_to_string(&path).unwrap()
            ),
        )
        .unwrap();

        clear_gradle_proxies(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "org.gradle.jvmargs=-Xmx2g\n");
    }
}
