//! Credit pack purchases.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use mpost_models::{CreditPack, CreditTransaction, TransactionType};

use crate::error::LedgerResult;
use crate::ledger::Ledger;

/// Result of crediting a purchased pack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub code: String,
    pub credits: u32,
    pub credits_total: u32,
}

/// Purchase code in the form `MP-XXXXXXXX-XXXXXXXX` (uppercase hex).
pub fn generate_purchase_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("MP-{}-{}", &hex[..8], &hex[8..16])
}

/// Credit a purchased pack to `user_id`.
///
/// The credited amount comes from the catalog entry, not from caller-supplied
/// metadata.
pub async fn purchase_credits(
    ledger: &dyn Ledger,
    user_id: &str,
    pack: &CreditPack,
    payment_reference: &str,
) -> LedgerResult<PurchaseReceipt> {
    let code = generate_purchase_code();

    let metadata = HashMap::from([
        ("code".to_string(), code.clone()),
        ("pack_type".to_string(), pack.pack_type.as_str().to_string()),
        ("payment_reference".to_string(), payment_reference.to_string()),
    ]);

    let tx = CreditTransaction::new(user_id, TransactionType::Purchase(pack.pack_type), pack.credits)
        .with_description(format!(
            "Purchased {} pack - Code: {}",
            pack.pack_type.as_str().to_uppercase(),
            code
        ))
        .with_metadata(metadata);

    let receipt = ledger.add_credits(&tx).await?;

    info!(
        user_id = %user_id,
        pack = %pack.pack_type,
        credits = pack.credits,
        total = receipt.credits_total,
        code = %code,
        "Credit pack purchased"
    );

    Ok(PurchaseReceipt {
        code,
        credits: pack.credits,
        credits_total: receipt.credits_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AddCreditsReceipt, CreditBalance, TransactionPage, UseCreditsReceipt};
    use async_trait::async_trait;
    use mpost_models::PackType;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLedger {
        added: Mutex<Vec<CreditTransaction>>,
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        async fn get_balance(&self, _user_id: &str) -> LedgerResult<CreditBalance> {
            Ok(CreditBalance {
                credits: 0,
                updated_at: None,
            })
        }

        async fn use_credits(&self, _tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt> {
            unreachable!()
        }

        async fn add_credits(&self, tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt> {
            self.added.lock().unwrap().push(tx.clone());
            Ok(AddCreditsReceipt {
                success: true,
                credits_total: tx.credits() + 10,
                message: None,
            })
        }

        async fn transaction_history(
            &self,
            _user_id: &str,
            _limit: u32,
            _offset: u32,
        ) -> LedgerResult<TransactionPage> {
            Ok(TransactionPage::default())
        }
    }

    #[test]
    fn test_purchase_code_format() {
        let code = generate_purchase_code();
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "MP");
        for part in &parts[1..] {
            assert_eq!(part.len(), 8);
            assert!(part.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
        assert_ne!(code, generate_purchase_code());
    }

    #[tokio::test]
    async fn test_purchase_credits_pack_amount() {
        let ledger = RecordingLedger::default();
        let pack = CreditPack::for_type(PackType::Business, None);

        let receipt = purchase_credits(&ledger, "user-1", &pack, "cs_test_1").await.unwrap();
        assert_eq!(receipt.credits, 500);
        assert_eq!(receipt.credits_total, 510);

        let added = ledger.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].transaction_type.tag(), "purchase_business");
        assert!(added[0]
            .description
            .starts_with("Purchased BUSINESS pack - Code: MP-"));
        let metadata = added[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["payment_reference"], "cs_test_1");
        assert_eq!(metadata["code"], receipt.code);
    }
}
