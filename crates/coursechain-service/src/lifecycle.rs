//! Transaction lifecycle: build, sign, submit, wait, decode.
//!
//! ```text
//! Building ──► Submitted ──► Confirmed
//!    │             │    └──► Reverted
//!    └─────────────┴───────► NetworkFailure
//! ```
//!
//! Every path ends in a [`TransactionOutcome`]; nothing here returns `Err`
//! to the caller or panics. Submissions are never retried automatically.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use coursechain_core::contract::{createCourseCall, purchaseCourseCall};
use coursechain_core::{
    Confirmation, CourseError, ErrorKind, EventDecoder, EventKind, PriceAmount,
    TransactionOutcome, TxState,
};
use coursechain_rpc::{BlockTag, CallRequest, EthClient, TransactionReceipt, TransportError};
use tokio::sync::{Mutex, OnceCell};

use crate::signer::{TransactionSigner, UnsignedTx};

/// Drives state-changing calls against the market for one credential.
pub struct TxManager {
    eth: EthClient,
    contract: Address,
    decoder: EventDecoder,
    signer: Option<Arc<dyn TransactionSigner>>,
    chain_id: OnceCell<u64>,
    /// Held from nonce lookup until the node accepted the raw transaction.
    submit_lock: Mutex<()>,
    poll_interval: Duration,
}

impl TxManager {
    pub fn new(
        eth: EthClient,
        contract: Address,
        signer: Option<Arc<dyn TransactionSigner>>,
        chain_id: Option<u64>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            eth,
            contract,
            decoder: EventDecoder::new(contract),
            signer,
            chain_id: OnceCell::new_with(chain_id),
            submit_lock: Mutex::new(()),
            poll_interval,
        }
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Create a course priced at `price` (decimal ether).
    pub async fn submit_create(
        &self,
        title: &str,
        description: &str,
        price: &str,
    ) -> TransactionOutcome {
        let built = validate_text("title", title)
            .and_then(|_| validate_text("description", description))
            .and_then(|_| PriceAmount::parse(price).map_err(CourseError::from));
        let price = match built {
            Ok(p) => p,
            Err(e) => return building_failure(&e),
        };

        let input = createCourseCall {
            _title: title.to_string(),
            _description: description.to_string(),
            _price: price.smallest_unit,
        }
        .abi_encode();

        tracing::info!(title, price = %price.decimal, "creating course");
        let outcome = self.execute("createCourse", input.into(), U256::ZERO).await;

        let course_id = outcome
            .events
            .iter()
            .find(|e| e.kind == EventKind::Created)
            .map(|e| e.course_id);
        if outcome.success && course_id.is_none() {
            tracing::warn!(
                tx = ?outcome.tx_hash,
                "confirmed createCourse emitted no CourseCreated log"
            );
        }
        outcome.with_course_id(course_id)
    }

    /// Purchase `course_id`, paying `payment` (decimal ether).
    pub async fn submit_purchase(&self, course_id: u64, payment: &str) -> TransactionOutcome {
        if course_id == 0 {
            return building_failure(&CourseError::invalid("course ids start at 1"));
        }
        let payment = match PriceAmount::parse(payment) {
            Ok(p) => p,
            Err(e) => return building_failure(&e.into()),
        };

        let input = purchaseCourseCall {
            _courseId: U256::from(course_id),
        }
        .abi_encode();

        tracing::info!(course_id, payment = %payment.decimal, "purchasing course");
        self.execute("purchaseCourse", input.into(), payment.smallest_unit)
            .await
            .with_course_id(Some(course_id))
    }

    async fn execute(
        &self,
        method: &'static str,
        input: Bytes,
        value: U256,
    ) -> TransactionOutcome {
        let Some(signer) = self.signer.as_deref() else {
            return building_failure(&CourseError::Signing(
                "no private key configured; the service is read-only".into(),
            ));
        };

        let request = CallRequest::new(self.contract, input)
            .with_from(signer.address())
            .with_value(value);

        let hash = match self.submit(signer, &request).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(method, error = %e, "submission failed");
                return TransactionOutcome::failed(state_for(&e), None, &e);
            }
        };
        tracing::info!(method, tx = %hash, "transaction submitted");

        let receipt = match self.wait_for_receipt(hash).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    method,
                    tx = %hash,
                    error = %e,
                    "lost track of submitted transaction"
                );
                return TransactionOutcome::failed(state_for(&e), Some(hash), &e);
            }
        };

        let confirmation = Confirmation {
            block_number: receipt.block_number_u64(),
            block_hash: receipt.block_hash,
            gas_used: receipt.gas_used_u64(),
            effective_gas_price: receipt.effective_gas_price_u128(),
        };

        if receipt.succeeded() {
            let events = self.decoder.decode_all(&receipt.logs, &EventKind::ALL);
            tracing::info!(
                method,
                tx = %hash,
                block = confirmation.block_number,
                gas_used = confirmation.gas_used,
                events = events.len(),
                "transaction confirmed"
            );
            return TransactionOutcome::confirmed(hash, confirmation, events);
        }

        let reason = self.replay_revert_reason(&request, confirmation.block_number).await;
        tracing::warn!(method, tx = %hash, reason = ?reason, "transaction reverted");
        let err = CourseError::Reverted { reason };
        TransactionOutcome::failed(TxState::Reverted, Some(hash), &err)
            .with_confirmation(confirmation)
    }

    /// Building and Submitted states; serialized so nonces stay distinct.
    async fn submit(
        &self,
        signer: &dyn TransactionSigner,
        request: &CallRequest,
    ) -> Result<B256, CourseError> {
        let _guard = self.submit_lock.lock().await;

        let chain_id = *self
            .chain_id
            .get_or_try_init(|| self.eth.chain_id())
            .await?;
        let nonce = self
            .eth
            .transaction_count(signer.address(), BlockTag::Pending)
            .await?;
        let gas_price = self.eth.gas_price().await?;
        let gas_limit = self
            .eth
            .estimate_gas(request)
            .await
            .map_err(CourseError::from_submission)?;

        let raw = signer.sign(UnsignedTx {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            to: request.to,
            value: request.value.unwrap_or_default(),
            input: request.data.clone(),
        })?;
        let local_hash = keccak256(&raw);
        tracing::debug!(
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            tx = %local_hash,
            "signed transaction"
        );

        match self.eth.send_raw_transaction(&raw).await {
            Ok(hash) => {
                if hash != local_hash {
                    tracing::warn!(
                        node = %hash,
                        local = %local_hash,
                        "node reported a different tx hash"
                    );
                }
                Ok(hash)
            }
            Err(TransportError::Rpc(e)) if is_already_known(&e.message) => {
                tracing::debug!(tx = %local_hash, "node already has the transaction");
                Ok(local_hash)
            }
            Err(e) => Err(CourseError::from_submission(e)),
        }
    }

    /// Poll until the receipt exists. No deadline; callers wrap in a timeout if needed.
    async fn wait_for_receipt(&self, hash: B256) -> Result<TransactionReceipt, CourseError> {
        loop {
            if let Some(receipt) = self.eth.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            tracing::trace!(tx = %hash, "receipt not yet available");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Re-run the call at the inclusion block to recover the revert reason.
    async fn replay_revert_reason(&self, request: &CallRequest, block: u64) -> Option<String> {
        match self.eth.call(request, BlockTag::Number(block)).await {
            Ok(_) => None,
            Err(e) => match CourseError::from(e) {
                CourseError::Reverted { reason } => reason,
                other => {
                    tracing::debug!(error = %other, "revert replay failed");
                    None
                }
            },
        }
    }
}

fn is_already_known(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already known")
}

fn validate_text(field: &str, value: &str) -> Result<(), CourseError> {
    if value.trim().is_empty() {
        return Err(CourseError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn building_failure(err: &CourseError) -> TransactionOutcome {
    tracing::debug!(error = %err, "rejected before submission");
    TransactionOutcome::failed(TxState::Building, None, err)
}

/// Terminal state a failure leaves the transaction in.
fn state_for(err: &CourseError) -> TxState {
    match err.kind() {
        ErrorKind::InvalidArgument | ErrorKind::Signing => TxState::Building,
        ErrorKind::Reverted => TxState::Reverted,
        ErrorKind::NetworkFailure | ErrorKind::Rejected | ErrorKind::NotFound => {
            TxState::NetworkFailure
        }
    }
}
