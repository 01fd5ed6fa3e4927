//! Contabilidad de licencias medidas: cada operación facturable consume crédito.

use crate::config::MeteringSettings;
use crate::error::{Error, Result};

/// Operaciones que pueden consumir crédito de la licencia.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillableOperation {
    Sign,
    RemoveSignatures,
}

/// Colaborador de medición invocado en cada operación facturable.
pub trait Metering {
    /// Registra el consumo de `operation` o falla si la licencia no lo permite.
    fn charge(&mut self, operation: BillableOperation) -> Result<()>;
}

impl<M: Metering + ?Sized> Metering for &mut M {
    fn charge(&mut self, operation: BillableOperation) -> Result<()> {
        (**self).charge(operation)
    }
}

/// Licencia medida local. Sin clave activada rechaza todo consumo.
pub struct Metered {
    public_key: Option<String>,
    settings: MeteringSettings,
    credit: u64,
    quantity: u64,
}

impl Metered {
    pub fn new(settings: MeteringSettings) -> Self {
        Self {
            public_key: None,
            settings,
            credit: 0,
            quantity: 0,
        }
    }

    /// Activa la licencia con el par de claves pública y privada.
    pub fn set_metered_key(&mut self, public_key: &str, private_key: &str) -> Result<()> {
        let public = public_key.trim();
        let private = private_key.trim();
        if public.is_empty() || private.is_empty() {
            return Err(Error::License(
                "las claves de la licencia medida no pueden estar vacías".to_string(),
            ));
        }
        if public == private {
            return Err(Error::License(
                "la clave pública y la privada deben ser distintas".to_string(),
            ));
        }

        // La clave privada sólo se valida; no se conserva en memoria.
        self.public_key = Some(public.to_string());
        self.credit = self.settings.initial_credit;
        log::info!(
            "Licencia medida activada con {} unidades de crédito",
            self.credit
        );
        Ok(())
    }

    pub fn is_activated(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// Crédito restante.
    pub fn consumption_credit(&self) -> u64 {
        self.credit
    }

    /// Número de operaciones facturadas desde la activación.
    pub fn consumption_quantity(&self) -> u64 {
        self.quantity
    }

    fn cost_of(&self, operation: BillableOperation) -> u64 {
        match operation {
            BillableOperation::Sign => self.settings.sign_cost,
            BillableOperation::RemoveSignatures if self.settings.bill_removals => {
                self.settings.sign_cost
            }
            BillableOperation::RemoveSignatures => 0,
        }
    }
}

impl Metering for Metered {
    fn charge(&mut self, operation: BillableOperation) -> Result<()> {
        let cost = self.cost_of(operation);
        if cost == 0 {
            return Ok(());
        }

        if !self.is_activated() {
            return Err(Error::License(
                "no hay una licencia medida activada".to_string(),
            ));
        }
        if self.credit < cost {
            return Err(Error::License(format!(
                "crédito insuficiente: quedan {}, se requieren {}",
                self.credit, cost
            )));
        }

        self.credit -= cost;
        self.quantity += 1;
        log::debug!(
            "Cobro de {:?}: crédito restante {}, consumo {}",
            operation,
            self.credit,
            self.quantity
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unactivated_license_fails_closed() {
        let mut metered = Metered::new(MeteringSettings::default());
        let result = metered.charge(BillableOperation::Sign);
        assert!(matches!(result, Err(Error::License(_))));
        assert_eq!(metered.consumption_quantity(), 0);
    }

    #[test]
    fn empty_keys_are_rejected() {
        let mut metered = Metered::new(MeteringSettings::default());
        assert!(matches!(
            metered.set_metered_key("", "MyPrivateKey"),
            Err(Error::License(_))
        ));
        assert!(!metered.is_activated());
    }

    #[test]
    fn charges_decrement_credit_until_exhausted() -> Result<()> {
        let mut metered = Metered::new(MeteringSettings {
            initial_credit: 2,
            sign_cost: 1,
            bill_removals: false,
        });
        metered.set_metered_key("MyPublicKey", "MyPrivateKey")?;

        metered.charge(BillableOperation::Sign)?;
        metered.charge(BillableOperation::RemoveSignatures)?;
        metered.charge(BillableOperation::Sign)?;

        assert_eq!(metered.consumption_credit(), 0);
        assert_eq!(metered.consumption_quantity(), 2);
        assert!(matches!(
            metered.charge(BillableOperation::Sign),
            Err(Error::License(_))
        ));
        Ok(())
    }

    #[test]
    fn removals_are_billed_when_configured() -> Result<()> {
        let mut metered = Metered::new(MeteringSettings {
            initial_credit: 5,
            sign_cost: 2,
            bill_removals: true,
        });
        metered.set_metered_key("MyPublicKey", "MyPrivateKey")?;

        metered.charge(BillableOperation::RemoveSignatures)?;

        assert_eq!(metered.consumption_credit(), 3);
        assert_eq!(metered.consumption_quantity(), 1);
        Ok(())
    }
}
