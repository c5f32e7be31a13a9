use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, ArrangementId, ComponentAmounts, PartnerId, PaymentId};

/// a partner's position in a co-lent account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub id: Uuid,
    pub account_id: AccountId,
    pub partner_id: PartnerId,
    pub role: PartnerRole,
    /// share of cash flows, e.g. 80.00 for 80%
    pub share_percent: Decimal,
    /// contracted yield for the partner; excess spread above it is withheld
    pub lender_yield: Option<Rate>,
    /// fee share when it differs from the principal share
    pub fee_share_percent: Option<Decimal>,
    pub fldg_arrangement_id: Option<ArrangementId>,
    pub principal_disbursed: Money,
    pub principal_collected: Money,
    pub interest_collected: Money,
    pub fees_collected: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerRole {
    /// external funder protected by servicer arrangements and FLDG
    Lender,
    /// sourcing partner servicing the loan
    Originator,
}

impl Participation {
    pub fn new(
        account_id: AccountId,
        partner_id: PartnerId,
        role: PartnerRole,
        share_percent: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            partner_id,
            role,
            share_percent,
            lender_yield: None,
            fee_share_percent: None,
            fldg_arrangement_id: None,
            principal_disbursed: Money::ZERO,
            principal_collected: Money::ZERO,
            interest_collected: Money::ZERO,
            fees_collected: Money::ZERO,
        }
    }
}

/// shares must sum to 100 within a cent of tolerance
pub fn validate_shares(participations: &[Participation]) -> Result<()> {
    let total: Decimal = participations.iter().map(|p| p.share_percent).sum();
    if (total - Decimal::ONE_HUNDRED).abs() > dec!(0.01) {
        return Err(LoanError::invalid_input(format!(
            "participation shares sum to {total}, expected 100"
        )));
    }
    Ok(())
}

/// servicing terms applied when splitting collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicerTerms {
    /// partner credited with servicer fee and withheld excess spread
    pub servicer_partner_id: PartnerId,
    /// annual servicer fee rate
    pub fee_rate: Rate,
    pub fee_basis: ServicerFeeBasis,
    pub withhold_excess_spread: bool,
}

/// the base the servicer fee accrues on; documents vary, so the
/// arrangement states it explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicerFeeBasis {
    OutstandingPrincipal,
    LenderShareOutstanding,
}

/// ledger entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    Disbursement,
    PrincipalCollection,
    InterestCollection,
    FeeCollection,
    ServicerFee,
    ExcessSpread,
}

/// one signed posting to a partner's running ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerLedgerEntry {
    pub id: Uuid,
    pub participation_id: Uuid,
    pub partner_id: PartnerId,
    pub kind: LedgerEntryKind,
    pub entry_date: NaiveDate,
    pub amount: Money,
    pub payment_id: Option<PaymentId>,
    pub running_balance: Money,
}

/// append-only partner ledger maintaining per-participation running balances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerLedger {
    pub entries: Vec<PartnerLedgerEntry>,
    balances: HashMap<Uuid, Money>,
}

impl PartnerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, participation_id: Uuid) -> Money {
        self.balances.get(&participation_id).copied().unwrap_or(Money::ZERO)
    }

    fn post(
        &mut self,
        participation: &Participation,
        kind: LedgerEntryKind,
        entry_date: NaiveDate,
        amount: Money,
        payment_id: Option<PaymentId>,
    ) -> PartnerLedgerEntry {
        let balance = self.balance(participation.id) + amount;
        self.balances.insert(participation.id, balance);
        let entry = PartnerLedgerEntry {
            id: Uuid::new_v4(),
            participation_id: participation.id,
            partner_id: participation.partner_id,
            kind,
            entry_date,
            amount,
            payment_id,
            running_balance: balance,
        };
        self.entries.push(entry.clone());
        entry
    }
}

/// inputs describing the collection being split
#[derive(Debug, Clone, Copy)]
pub struct CollectionContext {
    pub payment_id: PaymentId,
    pub value_date: NaiveDate,
    /// borrower rate on the account, for excess-spread withholding
    pub borrower_rate: Rate,
    /// outstanding principal, the default servicer-fee base
    pub principal_outstanding: Money,
    /// days covered by this collection period
    pub period_days: u32,
}

/// split collected components across participations, withholding servicer
/// fee and excess spread from lender interest and crediting them to the
/// servicer. postings conserve the collected cash exactly: the last partner
/// absorbs rounding remainders.
pub fn split_collection(
    participations: &mut [Participation],
    components: ComponentAmounts,
    servicer: Option<&ServicerTerms>,
    ctx: CollectionContext,
    ledger: &mut PartnerLedger,
) -> Result<Vec<PartnerLedgerEntry>> {
    if participations.is_empty() {
        return Ok(Vec::new());
    }
    validate_shares(participations)?;
    if let Some(terms) = servicer {
        if !participations.iter().any(|p| p.partner_id == terms.servicer_partner_id) {
            return Err(LoanError::invalid_input(
                "servicer partner has no participation on the account",
            ));
        }
    }

    let mut entries = Vec::new();
    let count = participations.len();

    let mut principal_left = components.principal;
    let mut interest_left = components.interest;
    let mut fees_left = components.fees;

    // servicer fee on the configured base, pro-rated over the period
    let lender_share_total: Decimal = participations
        .iter()
        .filter(|p| p.role == PartnerRole::Lender)
        .map(|p| p.share_percent)
        .sum();
    let servicer_fee = servicer
        .map(|terms| {
            let base = match terms.fee_basis {
                ServicerFeeBasis::OutstandingPrincipal => ctx.principal_outstanding,
                ServicerFeeBasis::LenderShareOutstanding => {
                    ctx.principal_outstanding.percentage(lender_share_total)
                }
            };
            Money::from_decimal(
                base.as_decimal() * terms.fee_rate.as_decimal() * Decimal::from(ctx.period_days)
                    / dec!(365),
            )
        })
        .unwrap_or(Money::ZERO);

    let mut servicer_income = Money::ZERO;
    let mut fee_left_to_withhold = servicer_fee;

    for (i, participation) in participations.iter_mut().enumerate() {
        let last = i == count - 1;

        // principal share
        let principal_share = if last {
            principal_left
        } else {
            components.principal.percentage(participation.share_percent).min(principal_left)
        };
        if principal_share.is_positive() {
            entries.push(ledger.post(
                participation,
                LedgerEntryKind::PrincipalCollection,
                ctx.value_date,
                principal_share,
                Some(ctx.payment_id),
            ));
            participation.principal_collected += principal_share;
            principal_left -= principal_share;
        }

        // interest share, with lender-side withholding
        let gross_interest = if last {
            interest_left
        } else {
            components.interest.percentage(participation.share_percent).min(interest_left)
        };
        if gross_interest.is_positive() {
            let mut net_interest = gross_interest;

            if participation.role == PartnerRole::Lender {
                if let Some(terms) = servicer {
                    // fee withheld pro-rata across lender participations
                    let fee_portion = if lender_share_total.is_zero() {
                        Money::ZERO
                    } else {
                        servicer_fee
                            .percentage(
                                participation.share_percent / lender_share_total
                                    * Decimal::ONE_HUNDRED,
                            )
                            .min(fee_left_to_withhold)
                            .min(net_interest)
                    };
                    net_interest -= fee_portion;
                    fee_left_to_withhold -= fee_portion;
                    servicer_income += fee_portion;

                    // excess spread: interest share x (borrower - yield) / borrower
                    if terms.withhold_excess_spread {
                        if let Some(yield_rate) = participation.lender_yield {
                            let borrower = ctx.borrower_rate.as_decimal();
                            let excess = (ctx.borrower_rate - yield_rate).as_decimal();
                            if excess > Decimal::ZERO && !borrower.is_zero() {
                                let withheld = Money::from_decimal(
                                    gross_interest.as_decimal() * excess / borrower,
                                )
                                .min(net_interest);
                                net_interest -= withheld;
                                servicer_income += withheld;
                            }
                        }
                    }
                }
            }

            if net_interest.is_positive() {
                entries.push(ledger.post(
                    participation,
                    LedgerEntryKind::InterestCollection,
                    ctx.value_date,
                    net_interest,
                    Some(ctx.payment_id),
                ));
            }
            participation.interest_collected += net_interest;
            interest_left -= gross_interest;
        }

        // fees share
        let fee_pct = participation.fee_share_percent.unwrap_or(participation.share_percent);
        let fee_share = if last {
            fees_left
        } else {
            components.fees.percentage(fee_pct).min(fees_left)
        };
        if fee_share.is_positive() {
            entries.push(ledger.post(
                participation,
                LedgerEntryKind::FeeCollection,
                ctx.value_date,
                fee_share,
                Some(ctx.payment_id),
            ));
            participation.fees_collected += fee_share;
            fees_left -= fee_share;
        }
    }

    // withheld amounts are income to the servicer
    if servicer_income.is_positive() {
        let terms = servicer.expect("withholding implies servicer terms");
        let servicer_participation = participations
            .iter()
            .find(|p| p.partner_id == terms.servicer_partner_id)
            .expect("servicer participation checked up front");
        entries.push(ledger.post(
            servicer_participation,
            LedgerEntryKind::ServicerFee,
            ctx.value_date,
            servicer_income,
            Some(ctx.payment_id),
        ));
    }

    Ok(entries)
}

/// post disbursement shares; negative amounts represent funding owed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementSplit {
    pub entries: Vec<PartnerLedgerEntry>,
}

pub fn split_disbursement(
    participations: &mut [Participation],
    principal: Money,
    disbursement_date: NaiveDate,
    ledger: &mut PartnerLedger,
) -> Result<DisbursementSplit> {
    validate_shares(participations)?;

    let count = participations.len();
    let mut left = principal;
    let mut entries = Vec::new();

    for (i, participation) in participations.iter_mut().enumerate() {
        let share = if i == count - 1 { left } else { principal.percentage(participation.share_percent).min(left) };
        entries.push(ledger.post(
            participation,
            LedgerEntryKind::Disbursement,
            disbursement_date,
            -share,
            None,
        ));
        participation.principal_disbursed += share;
        left -= share;
    }

    Ok(DisbursementSplit { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn eighty_twenty(account_id: AccountId, lender: PartnerId, originator: PartnerId) -> Vec<Participation> {
        vec![
            Participation::new(account_id, lender, PartnerRole::Lender, dec!(80)),
            Participation::new(account_id, originator, PartnerRole::Originator, dec!(20)),
        ]
    }

    fn context() -> CollectionContext {
        CollectionContext {
            payment_id: Uuid::new_v4(),
            value_date: date(2025, 3, 1),
            borrower_rate: Rate::from_percentage(dec!(14)),
            principal_outstanding: Money::from_major(100_000),
            period_days: 30,
        }
    }

    #[test]
    fn test_share_validation() {
        let account = Uuid::new_v4();
        let mut bad = eighty_twenty(account, Uuid::new_v4(), Uuid::new_v4());
        bad[1].share_percent = dec!(25);
        assert!(validate_shares(&bad).is_err());

        let good = eighty_twenty(account, Uuid::new_v4(), Uuid::new_v4());
        assert!(validate_shares(&good).is_ok());
    }

    #[test]
    fn test_split_with_servicer_fee_withholding() {
        let account = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let originator = Uuid::new_v4();
        let mut participations = eighty_twenty(account, lender, originator);
        let mut ledger = PartnerLedger::new();

        let servicer = ServicerTerms {
            servicer_partner_id: originator,
            fee_rate: Rate::from_percentage(dec!(0.5)),
            fee_basis: ServicerFeeBasis::OutstandingPrincipal,
            withhold_excess_spread: false,
        };

        let components = ComponentAmounts {
            principal: Money::from_major(10_000),
            interest: Money::from_major(1_200),
            fees: Money::ZERO,
        };
        let entries = split_collection(
            &mut participations,
            components,
            Some(&servicer),
            context(),
            &mut ledger,
        )
        .unwrap();

        // fee = 100000 x 0.5% x 30/365 = 41.10
        let fee = Money::from_str_exact("41.10").unwrap();
        let lender_principal = entry_amount(&entries, lender, LedgerEntryKind::PrincipalCollection);
        let lender_interest = entry_amount(&entries, lender, LedgerEntryKind::InterestCollection);
        let originator_principal =
            entry_amount(&entries, originator, LedgerEntryKind::PrincipalCollection);
        let originator_interest =
            entry_amount(&entries, originator, LedgerEntryKind::InterestCollection);
        let servicer_income = entry_amount(&entries, originator, LedgerEntryKind::ServicerFee);

        assert_eq!(lender_principal, Money::from_major(8_000));
        assert_eq!(lender_interest, Money::from_str_exact("918.90").unwrap());
        assert_eq!(originator_principal, Money::from_major(2_000));
        assert_eq!(originator_interest, Money::from_major(240));
        assert_eq!(servicer_income, fee);

        // conservation: postings equal the collected cash
        let posted: Money = entries.iter().map(|e| e.amount).sum();
        assert_eq!(posted, components.total());
    }

    #[test]
    fn test_excess_spread_withheld_from_lender() {
        let account = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let originator = Uuid::new_v4();
        let mut participations = eighty_twenty(account, lender, originator);
        participations[0].lender_yield = Some(Rate::from_percentage(dec!(10)));
        let mut ledger = PartnerLedger::new();

        let servicer = ServicerTerms {
            servicer_partner_id: originator,
            fee_rate: Rate::ZERO,
            fee_basis: ServicerFeeBasis::OutstandingPrincipal,
            withhold_excess_spread: true,
        };

        let components = ComponentAmounts {
            principal: Money::ZERO,
            interest: Money::from_major(1_400),
            fees: Money::ZERO,
        };
        let entries = split_collection(
            &mut participations,
            components,
            Some(&servicer),
            context(),
            &mut ledger,
        )
        .unwrap();

        // lender gross interest 1120; excess (14 - 10) / 14 of it withheld = 320
        let lender_interest = entry_amount(&entries, lender, LedgerEntryKind::InterestCollection);
        let withheld = entry_amount(&entries, originator, LedgerEntryKind::ServicerFee);
        assert_eq!(lender_interest, Money::from_major(800));
        assert_eq!(withheld, Money::from_major(320));

        let posted: Money = entries.iter().map(|e| e.amount).sum();
        assert_eq!(posted, components.total());
    }

    #[test]
    fn test_rounding_remainder_to_last_partner() {
        let account = Uuid::new_v4();
        let mut participations = vec![
            Participation::new(account, Uuid::new_v4(), PartnerRole::Lender, dec!(33.33)),
            Participation::new(account, Uuid::new_v4(), PartnerRole::Lender, dec!(33.33)),
            Participation::new(account, Uuid::new_v4(), PartnerRole::Originator, dec!(33.34)),
        ];
        let mut ledger = PartnerLedger::new();

        let components = ComponentAmounts {
            principal: Money::from_major(100),
            interest: Money::ZERO,
            fees: Money::ZERO,
        };
        let entries =
            split_collection(&mut participations, components, None, context(), &mut ledger).unwrap();

        let posted: Money = entries.iter().map(|e| e.amount).sum();
        assert_eq!(posted, Money::from_major(100));
    }

    #[test]
    fn test_running_balance_chains() {
        let account = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let originator = Uuid::new_v4();
        let mut participations = eighty_twenty(account, lender, originator);
        let mut ledger = PartnerLedger::new();

        let components = ComponentAmounts {
            principal: Money::from_major(1_000),
            interest: Money::ZERO,
            fees: Money::ZERO,
        };
        split_collection(&mut participations, components, None, context(), &mut ledger).unwrap();
        split_collection(&mut participations, components, None, context(), &mut ledger).unwrap();

        let lender_participation = participations[0].id;
        assert_eq!(ledger.balance(lender_participation), Money::from_major(1_600));
        let lender_entries: Vec<_> = ledger
            .entries
            .iter()
            .filter(|e| e.participation_id == lender_participation)
            .collect();
        assert_eq!(lender_entries[1].running_balance, lender_entries[0].running_balance + lender_entries[1].amount);
    }

    #[test]
    fn test_disbursement_split_negative_postings() {
        let account = Uuid::new_v4();
        let mut participations = eighty_twenty(account, Uuid::new_v4(), Uuid::new_v4());
        let mut ledger = PartnerLedger::new();

        let split = split_disbursement(
            &mut participations,
            Money::from_major(100_000),
            date(2025, 1, 1),
            &mut ledger,
        )
        .unwrap();

        assert_eq!(split.entries[0].amount, -Money::from_major(80_000));
        assert_eq!(split.entries[1].amount, -Money::from_major(20_000));
        assert_eq!(participations[0].principal_disbursed, Money::from_major(80_000));
    }

    fn entry_amount(
        entries: &[PartnerLedgerEntry],
        partner: PartnerId,
        kind: LedgerEntryKind,
    ) -> Money {
        entries
            .iter()
            .filter(|e| e.partner_id == partner && e.kind == kind)
            .map(|e| e.amount)
            .sum()
    }
}
