//! Anchored glob matching for argument patterns
//!
//! `*` matches any run of characters (including none). Every other character
//! is literal, so regex metacharacters and shell operators are plain data.
//! Commands are spawned without a shell, which is why comparing the rebuilt
//! argument string as literal text is sufficient.

/// Check whether `target` matches `pattern` in full.
///
/// Uses the two-pointer wildcard algorithm: on a mismatch the most recent
/// `*` absorbs one more byte and matching resumes after it. Only the latest
/// star is ever revisited, so runtime stays at O(pattern * target) in the
/// worst case with no exponential backtracking.
pub fn matches(pattern: &str, target: &str) -> bool {
    let p = pattern.as_bytes();
    let t = target.as_bytes();

    let (mut pi, mut ti) = (0, 0);
    // (index after the star in `p`, index in `t` the star currently extends to)
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            while pi < p.len() && p[pi] == b'*' {
                pi += 1;
            }
            backtrack = Some((pi, ti));
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            pi = star_p;
            ti = star_t + 1;
            backtrack = Some((star_p, ti));
        } else {
            return false;
        }
    }

    // Trailing stars match the empty remainder
    p[pi..].iter().all(|&b| b == b'*')
}

/// First pattern in declaration order that matches `target`
pub fn first_match<'a, S: AsRef<str>>(patterns: &'a [S], target: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(AsRef::as_ref)
        .find(|pattern| matches(pattern, target))
}

/// True if any pattern matches `target`
pub fn matches_any<S: AsRef<str>>(patterns: &[S], target: &str) -> bool {
    first_match(patterns, target).is_some()
}
