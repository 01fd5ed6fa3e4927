//! Firma digital de documentos OOXML.
//!
//! [`SignatureWorkflow`] carga, añade y elimina firmas sobre paquetes `.docx`,
//! comprobando certificado, rutas y contraseña antes de tocar el documento y
//! registrando cada operación facturable en un [`Metering`].

pub mod config;
pub mod error;
pub mod metered;
pub mod package;
pub mod signatures;
pub mod styles;

#[cfg(test)]
mod test_support;

pub use config::{RemovalPolicy, WorkflowConfig};
pub use error::{Error, Result};
pub use metered::{BillableOperation, Metered, Metering};
pub use package::{DocumentSource, DocumentTarget, LoadOptions, Package};
pub use signatures::{
    CertificateHolder, DigitalSignature, DigitalSignatureCollection, DigitalSignatureType,
    DocumentEngine, OoxmlEngine, SignOptions, SignatureWorkflow, load_signatures,
};
pub use styles::{Style, StyleSheet, StyleType, Theme};
