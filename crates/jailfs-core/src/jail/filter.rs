//! Mount path visibility and rewriting.

/// Outcome of filtering one mount path against a confinement root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// The mount is shown, under the rewritten path.
    Visible(String),
    /// The mount is not shown.
    Hidden,
}

impl Visibility {
    /// The rewritten path, if visible.
    #[must_use]
    pub fn into_path(self) -> Option<String> {
        match self {
            Self::Visible(path) => Some(path),
            Self::Hidden => None,
        }
    }
}

/// Decides whether `real_path` is visible under `root` and rewrites it
/// relative to `root`.
///
/// Only the first `root.len() - 1` bytes are compared, but `root.len()`
/// bytes are stripped. A path that differs from the root only in its last
/// byte therefore still matches: with root `/jail`, the mount `/jaix`
/// shows up as `""` and `/jails/db` as `/db`. Do not tighten the compare
/// without checking what existing callers display.
///
/// If the strip point falls inside a multi-byte character, the rest of
/// that character is dropped as well.
#[must_use]
pub fn filter_path(real_path: &str, root: &str) -> Visibility {
    if root == "/" {
        return Visibility::Visible(real_path.to_owned());
    }
    let compared = root.len().saturating_sub(1);
    let (path, root_bytes) = (real_path.as_bytes(), root.as_bytes());
    if path.len() < compared || path[..compared] != root_bytes[..compared] {
        return Visibility::Hidden;
    }
    let mut cut = root.len().min(real_path.len());
    while !real_path.is_char_boundary(cut) {
        cut += 1;
    }
    Visibility::Visible(real_path.get(cut..).unwrap_or_default().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_root_shows_everything_unchanged() {
        assert_eq!(
            filter_path("/usr/local", "/"),
            Visibility::Visible("/usr/local".into())
        );
        assert_eq!(filter_path("/", "/"), Visibility::Visible("/".into()));
    }

    #[test]
    fn mount_below_root_is_rewritten() {
        assert_eq!(
            filter_path("/jail/www/tmp", "/jail/www"),
            Visibility::Visible("/tmp".into())
        );
    }

    #[test]
    fn mount_at_root_rewrites_to_empty() {
        assert_eq!(filter_path("/jail", "/jail"), Visibility::Visible(String::new()));
    }

    #[test]
    fn mount_outside_root_is_hidden() {
        assert_eq!(filter_path("/usr", "/jail"), Visibility::Hidden);
        assert_eq!(filter_path("/", "/jail"), Visibility::Hidden);
        assert_eq!(filter_path("/ja", "/jail"), Visibility::Hidden);
    }

    #[test]
    fn last_root_byte_is_not_compared() {
        assert_eq!(filter_path("/jaix", "/jail"), Visibility::Visible(String::new()));
        assert_eq!(
            filter_path("/jaim/proc", "/jail"),
            Visibility::Visible("/proc".into())
        );
    }

    #[test]
    fn sibling_sharing_root_prefix_is_visible() {
        assert_eq!(
            filter_path("/jails/db", "/jail"),
            Visibility::Visible("/db".into())
        );
        assert_eq!(
            filter_path("/jailbreak", "/jail"),
            Visibility::Visible("break".into())
        );
    }

    #[test]
    fn path_shorter_than_root_rewrites_to_empty() {
        assert_eq!(filter_path("/jai", "/jail"), Visibility::Visible(String::new()));
    }

    #[test]
    fn strip_inside_multibyte_char_drops_the_whole_char() {
        assert_eq!(
            filter_path("/jai\u{e9}/x", "/jail"),
            Visibility::Visible("/x".into())
        );
        assert_eq!(filter_path("/jai\u{e9}", "/jail"), Visibility::Visible(String::new()));
    }

    #[test]
    fn into_path_unwraps_visible() {
        assert_eq!(Visibility::Visible("/a".into()).into_path(), Some("/a".into()));
        assert_eq!(Visibility::Hidden.into_path(), None);
    }
}
