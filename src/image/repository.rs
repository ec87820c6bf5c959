use crate::errors::ImageError;
use regex::Regex;

/// Path of an image repository on a registry
///
/// Repository names are path-like groupings of lowercase alphanumeric
/// segments separated by slashes. Each segment may also contain internal
/// separators: single periods, single or double underscores, or any number
/// of dashes.
#[derive(Clone)]
pub struct Repository {
    serialized: String,
}

serialized_string_impls!(Repository);

/// Iterator over the slash-separated components of a [Repository]
pub struct RepositoryIter<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Iterator for RepositoryIter<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl Repository {
    /// Returns a reference to the existing string representation
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    ///
    /// ```
    /// # use reginspect::image::Repository;
    /// let repo = Repository::parse("some/path").unwrap();
    /// let parts: Vec<&str> = repo.iter().collect();
    /// assert_eq!(parts, vec!["some", "path"])
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Repository {
                serialized: s.to_owned(),
            })
        } else {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    /// Iterate over the slash-separated path components
    pub fn iter(&self) -> RepositoryIter<'_> {
        RepositoryIter {
            inner: self.serialized.split('/'),
        }
    }

    /// Does this path have exactly one component?
    pub fn is_single_component(&self) -> bool {
        !self.serialized.contains('/')
    }

    /// Join this path to another with a slash, forming a new repository path
    pub fn join(&self, other: &Self) -> Self {
        Repository {
            serialized: format!("{}/{}", self.serialized, other.serialized),
        }
    }

    /// Remove a leading path prefix, if this path starts with it and has more
    /// components after it
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        self.serialized
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| Repository {
                serialized: rest.to_owned(),
            })
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<repo>",
            /*  */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // first component
            /*  */ "(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*", // more components
            ")"
        )
    }
}
