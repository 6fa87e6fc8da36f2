use std::cmp::Reverse;

use regex::Regex;

use super::WindowInfo;

/// Apply the retention policy for one tmux session's windows.
///
/// Windows whose name matches a preferred pattern are all kept. Without any
/// match only the most recently active window is kept.
pub fn retain_preferred(windows: Vec<WindowInfo>, preferred: &[Regex]) -> Vec<WindowInfo> {
    let is_preferred =
        |window: &WindowInfo| preferred.iter().any(|re| re.is_match(&window.name));

    if windows.iter().any(is_preferred) {
        return windows.into_iter().filter(is_preferred).collect();
    }

    most_active(&windows).cloned().into_iter().collect()
}

/// Pick the agent window of a session.
///
/// First match wins: working directory equal to the session path, then a
/// window name containing the slug, then the most recently active window.
pub fn disambiguate_window<'a>(
    windows: &'a [WindowInfo],
    session_path: &str,
    slug: &str,
) -> Option<&'a WindowInfo> {
    if windows.len() <= 1 {
        return windows.first();
    }

    if !session_path.is_empty() {
        if let Some(window) = windows.iter().find(|w| w.work_dir == session_path) {
            return Some(window);
        }
    }

    if !slug.is_empty() {
        let slug = slug.to_lowercase();
        if let Some(window) = windows
            .iter()
            .find(|w| w.name.to_lowercase().contains(&slug))
        {
            return Some(window);
        }
    }

    most_active(windows)
}

/// Highest activity marker; ties go to the lowest window index
fn most_active(windows: &[WindowInfo]) -> Option<&WindowInfo> {
    windows
        .iter()
        .max_by_key(|w| (w.activity, Reverse(w.index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn window(index: u32, name: &str, work_dir: &str, activity: u64) -> WindowInfo {
        WindowInfo {
            session_name: "proj".to_string(),
            index,
            name: name.to_string(),
            work_dir: work_dir.to_string(),
            activity,
        }
    }

    fn pattern(p: &str) -> Regex {
        RegexBuilder::new(p).case_insensitive(true).build().unwrap()
    }

    fn names(windows: &[WindowInfo]) -> Vec<&str> {
        windows.iter().map(|w| w.name.as_str()).collect()
    }

    #[test]
    fn test_retain_preferred_windows() {
        let windows = vec![
            window(0, "bash", "/p", 30),
            window(1, "claude", "/p", 10),
            window(2, "vim", "/p", 20),
        ];
        let kept = retain_preferred(windows, &[pattern("claude")]);
        assert_eq!(names(&kept), vec!["claude"]);
    }

    #[test]
    fn test_retain_all_matches_case_insensitively() {
        let windows = vec![
            window(0, "Claude", "/p", 1),
            window(1, "codex", "/p", 2),
            window(2, "vim", "/p", 3),
        ];
        let kept = retain_preferred(windows, &[pattern("claude"), pattern("^codex$")]);
        assert_eq!(names(&kept), vec!["Claude", "codex"]);
    }

    #[test]
    fn test_retain_most_active_without_match() {
        let windows = vec![window(0, "bash", "/p", 5), window(1, "vim", "/p", 9)];
        let kept = retain_preferred(windows, &[pattern("claude")]);
        assert_eq!(names(&kept), vec!["vim"]);

        assert!(retain_preferred(Vec::new(), &[]).is_empty());
    }

    #[test]
    fn test_path_match_beats_name_match() {
        let windows = vec![
            window(0, "proj-agent", "/elsewhere", 50),
            window(1, "zsh", "/work/proj", 1),
        ];
        let chosen = disambiguate_window(&windows, "/work/proj", "proj").unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn test_name_match_then_activity() {
        let windows = vec![
            window(0, "zsh", "/a", 50),
            window(1, "My-Proj", "/b", 1),
        ];
        assert_eq!(disambiguate_window(&windows, "/c", "my-proj").unwrap().index, 1);
        assert_eq!(disambiguate_window(&windows, "/c", "other").unwrap().index, 0);
    }

    #[test]
    fn test_single_window_returned_unconditionally() {
        let windows = vec![window(3, "anything", "/x", 0)];
        assert_eq!(disambiguate_window(&windows, "/y", "z").unwrap().index, 3);
        assert!(disambiguate_window(&[], "/y", "z").is_none());
    }
}
