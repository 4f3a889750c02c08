//! Asset path normalization
//!
//! Records carry asset references in several historical shapes:
//!
//! - canonical: `projects/1700000000000_ab12cd.png`
//! - S3 endpoint: `https://<ref>.storage.supabase.co/storage/v1/s3/Portfolio/projects/...`
//! - object routes: `https://<host>/storage/v1/object/{public,sign,...}/Portfolio/projects/...`
//! - bucket prefixed: `Portfolio/projects/...` or `portfolio/projects/...`
//!
//! [`PathNormalizer::normalize`] reduces all of them to the bucket-relative key.
//! Anything it does not recognise (foreign hosts) is passed through untouched;
//! the storage backend is responsible for rejecting it.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("No file path provided")]
    Empty,
}

/// Returns the number of leading bytes of `input` the rule consumes.
type Matcher = fn(input: &str, bucket: &str) -> Option<usize>;

struct PrefixRule {
    name: &'static str,
    strips_url: bool,
    matcher: Matcher,
}

/// Evaluated in order on every pass. Each rule is a no-op when it does not match.
const PREFIX_RULES: &[PrefixRule] = &[
    PrefixRule {
        name: "s3-endpoint",
        strips_url: true,
        matcher: s3_endpoint,
    },
    PrefixRule {
        name: "object-route",
        strips_url: true,
        matcher: object_route,
    },
    PrefixRule {
        name: "bucket-prefix",
        strips_url: false,
        matcher: bucket_prefix,
    },
    PrefixRule {
        name: "leading-slash",
        strips_url: false,
        matcher: leading_slashes,
    },
];

#[derive(Debug, Clone)]
pub struct PathNormalizer {
    bucket: String,
}

impl PathNormalizer {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Reduce `raw` to the canonical bucket-relative path.
    ///
    /// Rules are re-applied until nothing changes, so the result is a fixed
    /// point: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(&self, raw: &str) -> Result<String, PathError> {
        let mut current = raw.trim();
        if current.is_empty() {
            return Err(PathError::Empty);
        }

        let mut stripped_url = false;
        loop {
            let before = current.len();
            for rule in PREFIX_RULES {
                if let Some(consumed) = (rule.matcher)(current, &self.bucket) {
                    tracing::trace!(rule = rule.name, consumed, "Stripped path prefix");
                    current = &current[consumed..];
                    stripped_url |= rule.strips_url;
                }
            }
            if current.len() == before {
                break;
            }
        }

        // Signed-object URLs carry their token in the query string.
        if stripped_url {
            if let Some(cut) = current.find(['?', '#']) {
                current = &current[..cut];
            }
        }

        if current.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(current.to_string())
    }
}

/// True when a normalized reference still points somewhere outside our bucket.
pub fn is_external(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `Portfolio` and `portfolio` both appeared in stored URLs.
fn matches_bucket(segment: &str, bucket: &str) -> bool {
    let (mut seg_chars, mut bucket_chars) = (segment.chars(), bucket.chars());
    match (seg_chars.next(), bucket_chars.next()) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(&b) => seg_chars.as_str() == bucket_chars.as_str(),
        _ => false,
    }
}

/// Strip `<bucket>/` from the front of `rest`, returning what follows.
fn strip_bucket<'a>(rest: &'a str, bucket: &str) -> Option<&'a str> {
    let (segment, tail) = rest.split_once('/')?;
    matches_bucket(segment, bucket).then_some(tail)
}

/// Everything after `scheme://host/`.
fn after_host(input: &str) -> Option<&str> {
    let without_scheme = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))?;
    let (host, rest) = without_scheme.split_once('/')?;
    (!host.is_empty()).then_some(rest)
}

fn s3_endpoint(input: &str, bucket: &str) -> Option<usize> {
    let rest = after_host(input)?.strip_prefix("storage/v1/s3/")?;
    let tail = strip_bucket(rest, bucket)?;
    Some(input.len() - tail.len())
}

fn object_route(input: &str, bucket: &str) -> Option<usize> {
    let rest = after_host(input)?.strip_prefix("storage/v1/object/")?;
    let (access, rest) = rest.split_once('/')?;
    if access.is_empty() {
        return None;
    }
    let tail = strip_bucket(rest, bucket)?;
    Some(input.len() - tail.len())
}

fn bucket_prefix(input: &str, bucket: &str) -> Option<usize> {
    let tail = strip_bucket(input, bucket)?;
    Some(input.len() - tail.len())
}

fn leading_slashes(input: &str, _bucket: &str) -> Option<usize> {
    let trimmed = input.trim_start_matches('/');
    (trimmed.len() != input.len()).then_some(input.len() - trimmed.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PathNormalizer {
        PathNormalizer::new("Portfolio")
    }

    #[test]
    fn test_canonical_path_is_unchanged() {
        assert_eq!(normalizer().normalize("profiles/a.png").unwrap(), "profiles/a.png");
    }

    #[test]
    fn test_public_object_url() {
        let path = normalizer()
            .normalize("https://host/storage/v1/object/public/Portfolio/profiles/a.png")
            .unwrap();
        assert_eq!(path, "profiles/a.png");
    }

    #[test]
    fn test_signed_object_url_drops_token() {
        let path = normalizer()
            .normalize("https://abc.supabase.co/storage/v1/object/sign/portfolio/resumes/cv.pdf?token=xyz")
            .unwrap();
        assert_eq!(path, "resumes/cv.pdf");
    }

    #[test]
    fn test_s3_endpoint_url() {
        let path = normalizer()
            .normalize("https://ref.storage.supabase.co/storage/v1/s3/Portfolio/certificates/c.pdf")
            .unwrap();
        assert_eq!(path, "certificates/c.pdf");
    }

    #[test]
    fn test_bucket_prefix_and_leading_slash() {
        assert_eq!(normalizer().normalize("Portfolio/projects/p.png").unwrap(), "projects/p.png");
        assert_eq!(normalizer().normalize("portfolio/projects/p.png").unwrap(), "projects/p.png");
        assert_eq!(normalizer().normalize("///projects/p.png").unwrap(), "projects/p.png");
        assert_eq!(normalizer().normalize("/Portfolio/projects/p.png").unwrap(), "projects/p.png");
    }

    #[test]
    fn test_other_bucket_is_not_stripped() {
        assert_eq!(normalizer().normalize("Avatars/a.png").unwrap(), "Avatars/a.png");
        assert_eq!(normalizer().normalize("PORTFOLIO/a.png").unwrap(), "PORTFOLIO/a.png");
    }

    #[test]
    fn test_foreign_url_passes_through() {
        let url = "https://example.com/cert/verify?id=7";
        let path = normalizer().normalize(url).unwrap();
        assert_eq!(path, url);
        assert!(is_external(&path));
    }

    #[test]
    fn test_empty_input_fails_fast() {
        assert_eq!(normalizer().normalize(""), Err(PathError::Empty));
        assert_eq!(normalizer().normalize("   "), Err(PathError::Empty));
        assert_eq!(normalizer().normalize("Portfolio/"), Err(PathError::Empty));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "profiles/a.png",
            "/profiles/a.png",
            "Portfolio/profiles/a.png",
            "Portfolio/Portfolio/profiles/a.png",
            "/Portfolio//profiles/a.png",
            "https://host/storage/v1/object/public/Portfolio/profiles/a.png",
            "https://host/storage/v1/object/sign/portfolio/profiles/a.png?token=t",
            "https://r.storage.supabase.co/storage/v1/s3/Portfolio/profiles/a.png",
            "https://example.com/elsewhere.png",
        ];
        let n = normalizer();
        for input in inputs {
            let once = n.normalize(input).unwrap();
            let twice = n.normalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_url_shapes_agree_with_canonical_form() {
        let n = normalizer();
        let canonical = n.normalize("profiles/a.png").unwrap();
        for shape in [
            "https://h/storage/v1/object/public/Portfolio/profiles/a.png",
            "https://h/storage/v1/object/authenticated/Portfolio/profiles/a.png",
            "https://h.storage.supabase.co/storage/v1/s3/Portfolio/profiles/a.png",
            "Portfolio/profiles/a.png",
        ] {
            assert_eq!(n.normalize(shape).unwrap(), canonical);
        }
    }
}
