//! Splitting string paths into the component sequences the resolver
//! expects. There is exactly one root per [`crate::CasFs`], so a leading
//! slash is dropped rather than represented as a component; a *trailing*
//! slash is preserved as an empty final component, since that is what
//! forces a symlink at the tail to be followed.

use casfs_codec::RawName;

pub fn split_path(path: &str) -> Vec<RawName> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(RawName::from_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_absolute_path() {
        let parts = split_path("/a/b/c");
        let names: Vec<_> = parts.iter().map(|n| n.as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_slash_keeps_empty_component() {
        let parts = split_path("/a/b/");
        let names: Vec<_> = parts.iter().map(|n| n.as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", ""]);
    }

    #[test]
    fn root_path_is_empty() {
        assert!(split_path("/").is_empty());
    }
}
