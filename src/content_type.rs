use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

const EXTENSION_PARAMETER: &str = "; extension=";

/// Media type and canonical extension of one piece of content.
///
/// Two values are equal when both fields are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentType {
    /// e.g. `image/jpeg`
    pub media_type: String,
    /// e.g. `jpeg`, without a leading dot
    pub extension: String,
}
impl ContentType {
    pub fn new(media_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self { media_type: media_type.into(), extension: extension.into() }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{EXTENSION_PARAMETER}{}", self.media_type, self.extension)
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(EXTENSION_PARAMETER) {
            Some((media_type, extension)) if !media_type.is_empty() && !extension.is_empty() => {
                Ok(Self::new(media_type, extension))
            },
            _ => exn::bail!(ErrorKind::InvalidContentType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn display() {
        assert_eq!(ContentType::new("image/jpeg", "jpeg").to_string(), "image/jpeg; extension=jpeg");
    }

    #[rstest]
    #[case("image/jpeg; extension=jpeg", Some(ContentType::new("image/jpeg", "jpeg")))]
    #[case("application/octet-stream; extension=???", Some(ContentType::new("application/octet-stream", "???")))]
    #[case("image/jpeg", None)]
    #[case("; extension=jpeg", None)]
    #[case("image/jpeg; extension=", None)]
    fn parse(#[case] input: &str, #[case] expected: Option<ContentType>) {
        assert_eq!(input.parse::<ContentType>().ok(), expected);
    }

    #[test]
    fn equality_is_structural() {
        let a = ContentType::new("image/png", "png");
        let b = ContentType::new(String::from("image/png"), String::from("png"));
        assert_eq!(a, b);
        assert_ne!(a, ContentType::new("image/png", "apng"));
        assert_ne!(a, ContentType::new("image/apng", "png"));
        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[cfg(feature = "serde")]
    #[rstest]
    #[case(ContentType::new("image/jpeg", "jpeg"))]
    #[case(ContentType::new("application/octet-stream", "???"))]
    fn serde_fields(#[case] content_type: ContentType) {
        use figment::Figment;
        use figment::providers::Serialized;

        let figment = Figment::from(Serialized::defaults(&content_type));
        assert_eq!(figment.extract_inner::<String>("media_type").unwrap(), content_type.media_type);
        assert_eq!(figment.extract_inner::<String>("extension").unwrap(), content_type.extension);
        assert_eq!(figment.extract::<ContentType>().unwrap(), content_type);
    }
}
