use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::account::LoanAccount;
use crate::decimal::Money;
use crate::types::{AccountId, EclStage};

/// staging cut-offs and risk parameters for the ECL model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclConfig {
    /// DPD above which stage 1 ends
    pub stage1_max_dpd: u32,
    /// DPD above which stage 2 ends
    pub stage2_max_dpd: u32,
    /// 12-month PD for stage 1, as a percentage
    pub pd_stage1: Decimal,
    /// lifetime PD for stage 2, as a percentage
    pub pd_stage2: Decimal,
    pub lgd_secured: Decimal,
    pub lgd_unsecured: Decimal,
}

impl Default for EclConfig {
    fn default() -> Self {
        Self {
            stage1_max_dpd: 30,
            stage2_max_dpd: 90,
            pd_stage1: dec!(0.5),
            pd_stage2: dec!(5.0),
            lgd_secured: dec!(35.0),
            lgd_unsecured: dec!(65.0),
        }
    }
}

/// why an account landed in its stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageReason {
    WriteOff,
    Npa,
    Dpd,
    Restructured,
    Sicr,
    Performing,
}

/// stage assignment: first matching condition wins, most severe first
pub fn assign_stage(account: &LoanAccount, config: &EclConfig) -> (EclStage, StageReason) {
    if account.is_written_off {
        (EclStage::Stage3, StageReason::WriteOff)
    } else if account.is_npa {
        (EclStage::Stage3, StageReason::Npa)
    } else if account.dpd > config.stage2_max_dpd {
        (EclStage::Stage3, StageReason::Dpd)
    } else if account.is_restructured {
        (EclStage::Stage2, StageReason::Restructured)
    } else if account.dpd > config.stage1_max_dpd {
        (EclStage::Stage2, StageReason::Dpd)
    } else if account.sicr_flag {
        (EclStage::Stage2, StageReason::Sicr)
    } else {
        (EclStage::Stage1, StageReason::Performing)
    }
}

/// stage movement record written when staging changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclStaging {
    pub account_id: AccountId,
    pub staging_date: NaiveDate,
    pub previous_stage: EclStage,
    pub stage: EclStage,
    pub reason: StageReason,
    pub dpd_at_staging: u32,
}

/// month-end provision row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclProvision {
    pub account_id: AccountId,
    pub provision_date: NaiveDate,
    pub stage: EclStage,
    /// exposure at default: principal outstanding plus undrawn commitments
    /// (zero for the term loans here)
    pub ead: Money,
    /// applied probability of default, percentage
    pub pd: Decimal,
    /// applied loss given default, percentage
    pub lgd: Decimal,
    pub ecl_amount: Money,
    pub opening_provision: Money,
    pub charge: Money,
    pub release: Money,
    pub closing_provision: Money,
}

/// compute the provision for an account: ECL = EAD x PD x LGD, with a
/// 100% PD at stage 3. returns the provision row and the staging movement
/// when the stage changed.
pub fn compute_provision(
    account: &LoanAccount,
    config: &EclConfig,
    as_of: NaiveDate,
) -> (EclProvision, Option<EclStaging>) {
    let (stage, reason) = assign_stage(account, config);

    let pd = match stage {
        EclStage::Stage1 => config.pd_stage1,
        EclStage::Stage2 => config.pd_stage2,
        EclStage::Stage3 => Decimal::ONE_HUNDRED,
    };
    let lgd = if account.is_secured { config.lgd_secured } else { config.lgd_unsecured };

    let ead = account.principal_outstanding;
    let ecl_amount = Money::from_decimal(
        ead.as_decimal() * pd / Decimal::ONE_HUNDRED * lgd / Decimal::ONE_HUNDRED,
    );

    let opening = account.ecl_provision;
    let charge = (ecl_amount - opening).clamp_non_negative();
    let release = (opening - ecl_amount).clamp_non_negative();

    let movement = (stage != account.ecl_stage).then(|| EclStaging {
        account_id: account.id,
        staging_date: as_of,
        previous_stage: account.ecl_stage,
        stage,
        reason,
        dpd_at_staging: account.dpd,
    });

    let provision = EclProvision {
        account_id: account.id,
        provision_date: as_of,
        stage,
        ead,
        pd,
        lgd,
        ecl_amount,
        opening_provision: opening,
        charge,
        release,
        closing_provision: ecl_amount,
    };

    (provision, movement)
}

/// apply a provision run to the account
pub fn apply_provision(account: &mut LoanAccount, provision: &EclProvision) {
    account.ecl_stage = provision.stage;
    account.ecl_provision = provision.closing_provision;
    account.ecl_provision_date = Some(provision.provision_date);
}

/// per-stage portfolio totals for a provision run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StageTotals {
    pub accounts: u32,
    pub exposure: Money,
    pub provision: Money,
}

/// portfolio-level summary by stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclPortfolioSummary {
    pub summary_date: NaiveDate,
    pub stage1: StageTotals,
    pub stage2: StageTotals,
    pub stage3: StageTotals,
}

impl EclPortfolioSummary {
    pub fn from_provisions(summary_date: NaiveDate, provisions: &[EclProvision]) -> Self {
        let mut summary = Self {
            summary_date,
            stage1: StageTotals::default(),
            stage2: StageTotals::default(),
            stage3: StageTotals::default(),
        };
        for p in provisions {
            let bucket = match p.stage {
                EclStage::Stage1 => &mut summary.stage1,
                EclStage::Stage2 => &mut summary.stage2,
                EclStage::Stage3 => &mut summary.stage3,
            };
            bucket.accounts += 1;
            bucket.exposure += p.ead;
            bucket.provision += p.closing_provision;
        }
        summary
    }

    pub fn total_exposure(&self) -> Money {
        self.stage1.exposure + self.stage2.exposure + self.stage3.exposure
    }

    pub fn total_provision(&self) -> Money {
        self.stage1.provision + self.stage2.provision + self.stage3.provision
    }
}
