//! Flujo de firma digital: cargar, firmar y eliminar firmas de documentos.

mod certificate;
mod engine;
mod manifest;
mod options;
mod xmldsig;

pub use certificate::CertificateHolder;
pub use engine::{DocumentEngine, OoxmlEngine};
pub use options::{DigitalSignature, DigitalSignatureCollection, DigitalSignatureType, SignOptions};

use crate::config::WorkflowConfig;
use crate::error::{Error, Result};
use crate::metered::{BillableOperation, Metering};
use crate::package::{DocumentSource, DocumentTarget, LoadOptions};

/// Lee las firmas de un documento sin cifrar con el motor OOXML.
pub fn load_signatures<'a>(
    source: impl Into<DocumentSource<'a>>,
) -> Result<DigitalSignatureCollection> {
    load_signatures_with(&OoxmlEngine, source, &LoadOptions::default())
}

fn load_signatures_with<'a, E: DocumentEngine>(
    engine: &E,
    source: impl Into<DocumentSource<'a>>,
    options: &LoadOptions,
) -> Result<DigitalSignatureCollection> {
    let source = source.into();
    log::debug!("Leyendo firmas de {}", source.describe());
    let bytes = source.read_all()?;
    let document = engine.open(&bytes, options.password.as_deref())?;
    engine.read_signatures(&document)
}

/// Coordina las operaciones de firma sobre un motor de documentos y una licencia medida.
///
/// Las operaciones que consumen licencia toman `&mut self`, así que dos operaciones
/// sobre el mismo medidor nunca se solapan.
pub struct SignatureWorkflow<M, E = OoxmlEngine> {
    engine: E,
    meter: M,
    config: WorkflowConfig,
}

impl<M: Metering> SignatureWorkflow<M, OoxmlEngine> {
    pub fn new(meter: M) -> Self {
        Self::with_config(meter, WorkflowConfig::default())
    }

    pub fn with_config(meter: M, config: WorkflowConfig) -> Self {
        Self::with_engine(OoxmlEngine, meter, config)
    }
}

impl<M: Metering, E: DocumentEngine> SignatureWorkflow<M, E> {
    pub fn with_engine(engine: E, meter: M, config: WorkflowConfig) -> Self {
        Self {
            engine,
            meter,
            config,
        }
    }

    pub fn meter(&self) -> &M {
        &self.meter
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn into_meter(self) -> M {
        self.meter
    }

    /// Firmas del documento en su orden; vacío si no tiene ninguna.
    pub fn load_signatures<'a>(
        &self,
        source: impl Into<DocumentSource<'a>>,
    ) -> Result<DigitalSignatureCollection> {
        load_signatures_with(&self.engine, source, &LoadOptions::default())
    }

    /// Como [`Self::load_signatures`], pero admite la contraseña de un documento cifrado.
    pub fn load_signatures_with_options<'a>(
        &self,
        source: impl Into<DocumentSource<'a>>,
        options: &LoadOptions,
    ) -> Result<DigitalSignatureCollection> {
        load_signatures_with(&self.engine, source, options)
    }

    /// Escribe en `destination` una copia de `source` sin ninguna firma.
    ///
    /// Devuelve cuántas firmas se eliminaron.
    pub fn remove_all_signatures<'a, 'b>(
        &mut self,
        source: impl Into<DocumentSource<'a>>,
        destination: impl Into<DocumentTarget<'b>>,
    ) -> Result<usize> {
        self.remove_all_signatures_with_options(source, destination, &LoadOptions::default())
    }

    pub fn remove_all_signatures_with_options<'a, 'b>(
        &mut self,
        source: impl Into<DocumentSource<'a>>,
        destination: impl Into<DocumentTarget<'b>>,
        options: &LoadOptions,
    ) -> Result<usize> {
        let source = source.into();
        let destination = destination.into();
        source.validate()?;
        destination.validate()?;

        log::debug!(
            "Eliminando firmas de {} hacia {}",
            source.describe(),
            destination.describe()
        );
        let bytes = source.read_all()?;
        let mut document = self.engine.open(&bytes, options.password.as_deref())?;

        self.meter.charge(BillableOperation::RemoveSignatures)?;
        let removed = self
            .engine
            .strip_signatures(&mut document, self.config.removal)?;
        let output = self.engine.save(&document)?;
        destination.write_all(&output)?;

        log::info!("Se eliminaron {} firmas", removed);
        Ok(removed)
    }

    /// Firma `source` con `holder` y escribe la copia firmada en `destination`.
    ///
    /// Comprobaciones, en orden: certificado presente, rutas no vacías (antes de
    /// cualquier E/S), contraseña válida si el documento está cifrado y, por último,
    /// crédito de licencia.
    pub fn sign<'a, 'b>(
        &mut self,
        source: impl Into<DocumentSource<'a>>,
        destination: impl Into<DocumentTarget<'b>>,
        holder: Option<&CertificateHolder>,
        options: &SignOptions,
    ) -> Result<DigitalSignature> {
        let holder = holder.ok_or(Error::MissingCertificate)?;
        let source = source.into();
        let destination = destination.into();
        source.validate()?;
        destination.validate()?;

        log::debug!(
            "Firmando {} hacia {}",
            source.describe(),
            destination.describe()
        );
        let bytes = source.read_all()?;
        let mut document = self
            .engine
            .open(&bytes, options.decryption_password.as_deref())?;

        self.meter.charge(BillableOperation::Sign)?;
        let signature = self
            .engine
            .append_signature(&mut document, holder, options)?;
        let output = self.engine.save(&document)?;
        destination.write_all(&output)?;

        log::info!("Documento firmado por {}", holder.subject());
        Ok(signature)
    }
}
