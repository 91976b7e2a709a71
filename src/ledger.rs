use crate::error::LedgerError;
use crate::schemas::Name;
use serde::Serialize;
use std::collections::BTreeMap;

/// Balances at or below this magnitude are treated as zero and dropped.
pub const EPSILON: f64 = 1e-9;

pub const NO_DEBTS_MESSAGE: &str = "No outstanding debts. Everyone is square!";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Debt {
    pub debtor: Name,
    pub creditor: Name,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseSummary {
    pub per_person: f64,
    pub participants: Vec<Name>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettlementOutcome {
    /// The debt is gone. `surplus` is whatever was paid beyond it, which is not
    /// carried anywhere.
    FullySettled { surplus: f64 },
    Remaining { balance: f64 },
}

/// Who owes whom. `debts[debtor][creditor]` only exists while strictly
/// positive, and never alongside `debts[creditor][debtor]`.
#[derive(Clone, Debug, Default)]
pub struct DebtLedger {
    debts: BTreeMap<Name, BTreeMap<Name, f64>>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owed(&self, debtor: &str, creditor: &str) -> f64 {
        self.debts
            .get(debtor)
            .and_then(|creditors| creditors.get(creditor))
            .copied()
            .unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.debts.is_empty()
    }

    /// Splits `amount` evenly among `participants` and charges everyone but the
    /// payer their share, netted against what the payer already owes them.
    pub fn record_expense(
        &mut self,
        payer: &str,
        amount: f64,
        participants: &[Name],
    ) -> Result<ExpenseSummary, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let participants = dedup_names(participants);
        if participants.is_empty() {
            return Err(LedgerError::EmptyParticipantList);
        }

        let per_person = amount / participants.len() as f64;
        let charged: Vec<&Name> = participants.iter().filter(|p| p.as_str() != payer).collect();
        // Checked up front so a failed expense leaves no partial charges behind
        if charged
            .iter()
            .any(|p| !(self.owed(p, payer) + per_person).is_finite())
        {
            return Err(LedgerError::InvalidAmount(amount));
        }
        for participant in charged {
            self.charge(participant, payer, per_person)?;
        }

        Ok(ExpenseSummary {
            per_person,
            participants,
        })
    }

    pub fn record_settlement(
        &mut self,
        payer: &str,
        receiver: &str,
        amount: f64,
    ) -> Result<SettlementOutcome, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let owed = self.owed(payer, receiver);
        if owed <= EPSILON {
            return Err(LedgerError::NoSuchDebt {
                payer: payer.to_string(),
                receiver: receiver.to_string(),
            });
        }

        let remaining = owed - amount;
        if remaining <= EPSILON {
            self.remove(payer, receiver);
            let surplus = amount - owed;
            Ok(SettlementOutcome::FullySettled {
                surplus: if surplus > EPSILON { surplus } else { 0.0 },
            })
        } else {
            self.set(payer, receiver, remaining)?;
            Ok(SettlementOutcome::Remaining { balance: remaining })
        }
    }

    /// Every stored debt, ordered by debtor then creditor.
    pub fn list_debts(&self) -> Vec<Debt> {
        self.debts
            .iter()
            .flat_map(|(debtor, creditors)| {
                creditors.iter().map(move |(creditor, amount)| Debt {
                    debtor: debtor.clone(),
                    creditor: creditor.clone(),
                    amount: *amount,
                })
            })
            .collect()
    }

    // Adds `amount` to what `debtor` owes `creditor`, first eating into any
    // debt running the other way so only one direction is ever stored
    fn charge(&mut self, debtor: &str, creditor: &str, amount: f64) -> Result<(), LedgerError> {
        let reverse = self.owed(creditor, debtor);
        if reverse <= EPSILON {
            let owed = self.owed(debtor, creditor);
            self.set(debtor, creditor, owed + amount)
        } else if reverse >= amount {
            self.set(creditor, debtor, reverse - amount)
        } else {
            let owed = self.owed(debtor, creditor);
            self.set(debtor, creditor, owed + (amount - reverse))?;
            self.remove(creditor, debtor);
            Ok(())
        }
    }

    // Non-finite balances could never be settled, so they are never stored
    fn set(&mut self, debtor: &str, creditor: &str, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount <= EPSILON {
            self.remove(debtor, creditor);
            return Ok(());
        }
        self.debts
            .entry(debtor.to_string())
            .or_default()
            .insert(creditor.to_string(), amount);
        Ok(())
    }

    fn remove(&mut self, debtor: &str, creditor: &str) {
        if let Some(creditors) = self.debts.get_mut(debtor) {
            creditors.remove(creditor);
            if creditors.is_empty() {
                self.debts.remove(debtor);
            }
        }
    }
}

pub fn render_debts(debts: &[Debt]) -> String {
    if debts.is_empty() {
        return NO_DEBTS_MESSAGE.to_string();
    }
    debts
        .iter()
        .map(|debt| format!("{} owes {} {:.2}", debt.debtor, debt.creditor, debt.amount))
        .collect::<Vec<_>>()
        .join("\n")
}

// Keeps the first occurrence of each name
pub(crate) fn dedup_names(names: &[Name]) -> Vec<Name> {
    let mut unique: Vec<Name> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    unique
}
