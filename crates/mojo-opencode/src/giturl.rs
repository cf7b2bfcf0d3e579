//! Git URL normalisation (spec §3/§4.6): `git@host:org/repo(.git)` and
//! `https://host/org/repo(.git)` fold to the same canonical key,
//! `<lowercased-host>/<org>/<repo>`, used as the project registry's
//! primary key.

/// Normalise a git remote URL into its canonical `host/org/repo` form.
pub fn normalize(url: &str) -> String {
    let trimmed = url.trim();

    let (host, path) = if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.split_once(':').unwrap_or((rest, ""))
    } else if let Some(rest) = trimmed.strip_prefix("ssh://git@") {
        rest.split_once('/').unwrap_or((rest, ""))
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        rest.split_once('/').unwrap_or((rest, ""))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        rest.split_once('/').unwrap_or((rest, ""))
    } else {
        (trimmed, "")
    };

    let host = host.to_lowercase();
    let path = path.trim_end_matches(".git").trim_matches('/');
    format!("{host}/{path}")
}

/// Derive a filesystem-safe project name from a normalised git URL: the
/// last path segment (the repo name).
pub fn derive_project_name(normalized_url: &str) -> String {
    normalized_url.rsplit('/').next().unwrap_or(normalized_url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_and_https_forms_fold_to_the_same_key() {
        let ssh = normalize("git@github.com:user/repo.git");
        let https = normalize("https://github.com/user/repo.git");
        let https_no_suffix = normalize("https://github.com/user/repo");
        assert_eq!(ssh, "github.com/user/repo");
        assert_eq!(ssh, https);
        assert_eq!(ssh, https_no_suffix);
    }

    #[test]
    fn host_is_lowercased() {
        assert_eq!(normalize("https://GitHub.com/user/Repo.git"), "github.com/user/Repo");
    }

    #[test]
    fn project_name_is_the_last_path_segment() {
        assert_eq!(derive_project_name("github.com/user/repo"), "repo");
    }
}
