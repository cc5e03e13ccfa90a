pub mod base_stream;
pub mod config;
pub mod decode;
pub mod document;
pub mod encryption;
pub mod error;
pub mod lexer;
pub mod metadata;
pub mod name_tree;
pub mod outline;
pub mod page;
pub mod parser;
pub mod profile;
pub mod report;
pub mod stream;
pub mod trailer;
pub mod validator;
pub mod xref;

pub use base_stream::BaseStream;
pub use config::ValidatorConfig;
pub use decode::FilterKind;
pub use document::{Header, Linearization, PDFDocument};
pub use encryption::{EncryptionInfo, PDFPermissions};
pub use error::{PDFError, PDFResult};
pub use lexer::{Lexer, Token};
pub use metadata::{CatalogInfo, FontInfo, ImageInfo, ResourceSummary, XmpInfo};
pub use outline::{Destination, DestinationResolver, Outline, OutlineItem};
pub use page::{Page, PageLabels, PageTree};
pub use parser::{Dict, IndirectObject, PDFObject, PDFStream, Parser};
pub use profile::{DocumentFacts, ProfileChecker, ProfileContext, ProfileOutcome, ProfileRegistry};
pub use report::{Checksums, Message, Property, PropertyValue, Severity, Tristate, ValidationReport};
pub use stream::Stream;
pub use trailer::{Trailer, TrailerChain};
pub use validator::{Validator, validate, validate_file};
pub use xref::{XRef, XRefEntry, XRefStats};
