//! # pkit-codec
//!
//! Byte-level codecs writing into a [`WBuffer`].
//!
//! ## Modules
//!
//! - `wbuffer` - Output sink trait, `Vec<u8>` and fixed-slice sinks
//! - `urlencode` - Percent encoding with an exempted byte
//! - `base64` - RFC 4648 Base64
//! - `strsearch` - Good-suffix substring search, forward and reverse
//! - `url` - `http` URL record: parse, build, encode
//!
//! On failure every codec leaves the sink at the size it had on entry.

pub mod wbuffer;
pub mod urlencode;
pub mod base64;
pub mod strsearch;
pub mod url;

pub use wbuffer::{StaticBuffer, WBuffer};
pub use urlencode::{size_urldecode, size_urlencode, urldecode, urlencode};
pub use self::base64::{base64decode, base64encode, size_base64decode, size_base64encode};
pub use strsearch::{rsearch, search, RevStrSearch, StrSearch, MAX_PATTERN};
pub use url::{Url, UrlField, UrlParts};
