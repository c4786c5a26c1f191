use clap::ValueEnum;

/// How the fee fields of a transaction type are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRule {
    /// Fee cap, tip cap, price and effective price all equal the fetched gas price.
    Legacy,
    /// Effective price is the fetched gas price; price and fee cap are the
    /// fetched max fee. The tip cap is checked against the fetched max
    /// priority fee only when `check_tip` is set.
    DynamicFee { check_tip: bool },
    /// Fees are not compared for this type.
    Unchecked,
}

/// How an optional transaction field is compared once both sides carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalKind {
    /// Compared by numeric value; the dump may hold a decimal integer.
    Quantity,
    /// Hashes, addresses and byte strings: compared as text, ignoring case.
    Data,
}

/// Field-rule table for one dump schema.
#[derive(Debug, Clone, Copy)]
pub struct ChainProfile {
    pub name: &'static str,
    pub legacy_types: &'static [u8],
    pub dynamic_fee_types: &'static [u8],
    pub unchecked_types: &'static [u8],
    pub check_tip_cap: bool,
    /// Block records carry `l1BlockNumber` and `baseFeePerGas`.
    pub block_l1_fields: bool,
    /// Transaction records carry `gasUsedForL1`, `l1BlockNumber` and an
    /// effective gas price that must match the receipt.
    pub receipt_l1_fields: bool,
    /// Fields that must be dumped iff the node returns them.
    pub optional_txn_fields: &'static [(&'static str, OptionalKind)],
}

pub const ETHEREUM: ChainProfile = ChainProfile {
    name: "ethereum",
    legacy_types: &[0, 1],
    dynamic_fee_types: &[2],
    unchecked_types: &[],
    check_tip_cap: true,
    block_l1_fields: false,
    receipt_l1_fields: false,
    optional_txn_fields: &[],
};

pub const ARBITRUM: ChainProfile = ChainProfile {
    name: "arbitrum",
    // 100 deposit, 106 internal
    legacy_types: &[0, 1, 100, 106],
    dynamic_fee_types: &[2],
    // 104 retry, 105 submit retryable
    unchecked_types: &[104, 105],
    check_tip_cap: false,
    block_l1_fields: true,
    receipt_l1_fields: true,
    optional_txn_fields: &[
        ("requestId", OptionalKind::Data),
        ("refundTo", OptionalKind::Data),
        ("l1BaseFee", OptionalKind::Quantity),
        ("depositValue", OptionalKind::Quantity),
        ("retryTo", OptionalKind::Data),
        ("retryData", OptionalKind::Data),
        ("beneficiary", OptionalKind::Data),
        ("maxSubmissionFee", OptionalKind::Quantity),
        ("ticketId", OptionalKind::Data),
        ("maxRefund", OptionalKind::Quantity),
        ("submissionFeeRefund", OptionalKind::Quantity),
    ],
};

impl ChainProfile {
    /// `None` for type codes the profile does not know.
    pub fn fee_rule(&self, tx_type: u8) -> Option<FeeRule> {
        if self.legacy_types.contains(&tx_type) {
            Some(FeeRule::Legacy)
        } else if self.dynamic_fee_types.contains(&tx_type) {
            Some(FeeRule::DynamicFee {
                check_tip: self.check_tip_cap,
            })
        } else if self.unchecked_types.contains(&tx_type) {
            Some(FeeRule::Unchecked)
        } else {
            None
        }
    }
}

/// Dump schema selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Chain {
    Ethereum,
    Arbitrum,
}

impl Chain {
    pub fn profile(self) -> &'static ChainProfile {
        match self {
            Chain::Ethereum => &ETHEREUM,
            Chain::Arbitrum => &ARBITRUM,
        }
    }
}
