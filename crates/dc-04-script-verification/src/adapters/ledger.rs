//! Ledger port implementations backed by the application engine.

use crate::domain::{ApplicationEngine, TriggerType, VmState};
use crate::service::verify_witnesses;
use dc_02_ledger::{ContractExecutor, Snapshot, Transaction, TransactionData, Verifiable, WitnessVerifier};
use tracing::{debug, info};

/// Runs witness scripts for the ledger's verification rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptWitnessVerifier;

impl WitnessVerifier for ScriptWitnessVerifier {
    fn verify_witnesses(&self, verifiable: &dyn Verifiable, snapshot: &Snapshot) -> bool {
        match verify_witnesses(verifiable, snapshot) {
            Ok(()) => true,
            Err(error) => {
                debug!(%error, "Witness verification failed");
                false
            }
        }
    }
}

/// Runs invocation transactions under the application trigger with the
/// transaction's gas on top of the free allowance.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptContractExecutor;

impl ContractExecutor for ScriptContractExecutor {
    fn execute(&self, tx: &Transaction, snapshot: &mut Snapshot) -> bool {
        let TransactionData::Invocation { script, gas } = tx.data() else {
            return false;
        };
        let result = ApplicationEngine::run(
            script.clone(),
            TriggerType::Application,
            tx,
            snapshot,
            *gas,
        );
        info!(
            tx = %tx.hash(),
            state = ?result.state,
            gas_consumed = %result.gas_consumed,
            "Invocation executed"
        );
        if let Some(fault) = &result.fault {
            debug!(tx = %tx.hash(), %fault, "Invocation faulted");
        }
        result.state == VmState::Halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interop::{STORAGE_GET_CONTEXT, STORAGE_PUT};
    use crate::test_utils::{snapshot, storage_contract};
    use dc_02_ledger::StorageKey;
    use shared_crypto::{opcode, ScriptBuilder};
    use shared_types::Fixed8;

    fn invocation(script: Vec<u8>) -> Transaction {
        Transaction::new(
            1,
            TransactionData::Invocation {
                script,
                gas: Fixed8::ZERO,
            },
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_executor_writes_contract_storage() {
        let mut snapshot = snapshot();
        let mut body = ScriptBuilder::new();
        body.emit_push_bytes(b"1")
            .emit_push_bytes(b"counter")
            .emit_syscall(STORAGE_GET_CONTEXT)
            .emit_syscall(STORAGE_PUT);
        let contract = storage_contract(body.to_vec());
        let hash = contract.script_hash();
        snapshot.contracts.add(hash, contract).unwrap();

        let mut call = ScriptBuilder::new();
        call.emit_app_call(&hash);
        assert!(ScriptContractExecutor.execute(&invocation(call.to_vec()), &mut snapshot));
        let stored = snapshot
            .storages
            .get(&StorageKey::new(hash, b"counter".to_vec()))
            .unwrap();
        assert_eq!(stored.value, b"1".to_vec());
    }

    #[test]
    fn test_executor_reports_fault() {
        let mut snapshot = snapshot();
        assert!(!ScriptContractExecutor.execute(&invocation(vec![opcode::THROW]), &mut snapshot));
        let transfer = Transaction::contract(Vec::new(), Vec::new());
        assert!(!ScriptContractExecutor.execute(&transfer, &mut snapshot));
    }
}
