//! # Verification Gate
//!
//! Checks every witness of a verifiable object against the script hashes
//! the object requires. A witness passes when its invocation script followed
//! by its verification script halts with exactly one item that is true.

use crate::domain::{
    ApplicationEngine, TriggerType, VerificationError, VerificationResult, VmError, VmState,
};
use dc_02_ledger::{Snapshot, Verifiable};
use shared_crypto::ScriptBuilder;
use shared_types::Fixed8;

/// Verify all witnesses of `verifiable`, in order, against `snapshot`.
///
/// Scripts run in a child snapshot, so `snapshot` is never changed.
pub fn verify_witnesses(verifiable: &dyn Verifiable, snapshot: &Snapshot) -> VerificationResult<()> {
    let hashes = verifiable.script_hashes_for_verifying(snapshot)?;
    let witnesses = verifiable.witnesses();
    if hashes.len() != witnesses.len() {
        return Err(VerificationError::WitnessCount {
            expected: hashes.len(),
            actual: witnesses.len(),
        });
    }

    for (script_hash, witness) in hashes.into_iter().zip(witnesses) {
        let verification = if witness.verification_script.is_empty() {
            let mut builder = ScriptBuilder::new();
            builder.emit_app_call(&script_hash);
            builder.into_script()
        } else {
            if witness.script_hash() != script_hash {
                return Err(VerificationError::ScriptHashMismatch {
                    expected: script_hash,
                });
            }
            witness.verification_script.clone()
        };

        let mut sandbox = snapshot.create_snapshot();
        let mut engine =
            ApplicationEngine::new(TriggerType::Verification, verifiable, &mut sandbox, Fixed8::ZERO);
        engine.load_script(verification);
        engine.load_script(witness.invocation_script.clone());
        if engine.execute() == VmState::Fault {
            return Err(VerificationError::Fault {
                script_hash,
                source: engine.fault().cloned().unwrap_or(VmError::Throw),
            });
        }
        match engine.result_stack() {
            [item] if item.to_bool() => {}
            [_] => return Err(VerificationError::Rejected(script_hash)),
            items => {
                return Err(VerificationError::StackShape {
                    script_hash,
                    items: items.len(),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contract;
    use crate::test_utils::{keys, snapshot, storage_contract, StaticContainer};
    use dc_02_ledger::Witness;
    use shared_crypto::{opcode, signature_contract_hash};
    use std::collections::BTreeMap;

    fn signed_by(pair: &shared_crypto::KeyPair, data: &[u8]) -> StaticContainer {
        let contract = Contract::create_signature_contract(&pair.public_key());
        let mut container = StaticContainer::new(data.to_vec());
        container.hashes = vec![contract.script_hash()];
        let signatures = BTreeMap::from([(pair.public_key(), pair.sign(data))]);
        container.witnesses = vec![contract.create_witness(&signatures).unwrap()];
        container
    }

    #[test]
    fn test_signature_witness_passes() {
        let pair = &keys(1)[0];
        let container = signed_by(pair, b"tx");
        assert_eq!(verify_witnesses(&container, &snapshot()), Ok(()));
    }

    #[test]
    fn test_signature_over_other_data_is_rejected() {
        let pair = &keys(1)[0];
        let mut container = signed_by(pair, b"tx");
        container.data = b"changed".to_vec();
        assert_eq!(
            verify_witnesses(&container, &snapshot()),
            Err(VerificationError::Rejected(signature_contract_hash(&pair.public_key())))
        );
    }

    #[test]
    fn test_witness_count_must_match() {
        let pair = &keys(1)[0];
        let mut container = signed_by(pair, b"tx");
        container.witnesses.push(Witness::default());
        assert!(matches!(
            verify_witnesses(&container, &snapshot()),
            Err(VerificationError::WitnessCount { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_swapped_verification_script_is_tampering() {
        let pairs = keys(2);
        let mut container = signed_by(&pairs[0], b"tx");
        let other = signed_by(&pairs[1], b"tx");
        container.witnesses = other.witnesses;
        assert_eq!(
            verify_witnesses(&container, &snapshot()),
            Err(VerificationError::ScriptHashMismatch {
                expected: signature_contract_hash(&pairs[0].public_key())
            })
        );
    }

    #[test]
    fn test_stack_shape_and_faults() {
        let verification = vec![opcode::PUSHT];
        let mut container = StaticContainer::new(Vec::new());
        container.hashes = vec![shared_crypto::script_hash(&verification)];

        container.witnesses = vec![Witness::new(vec![opcode::PUSHT], verification.clone())];
        assert!(matches!(
            verify_witnesses(&container, &snapshot()),
            Err(VerificationError::StackShape { items: 2, .. })
        ));

        container.witnesses = vec![Witness::new(vec![opcode::THROW], verification.clone())];
        assert!(matches!(
            verify_witnesses(&container, &snapshot()),
            Err(VerificationError::Fault { source: VmError::Throw, .. })
        ));

        container.witnesses = vec![Witness::new(Vec::new(), verification)];
        assert_eq!(verify_witnesses(&container, &snapshot()), Ok(()));
    }

    #[test]
    fn test_empty_verification_calls_deployed_contract() {
        let mut snapshot = snapshot();
        // succeeds only when handed the number 42
        let mut body = ScriptBuilder::new();
        body.emit_push_int(42).emit(opcode::NUMEQUAL);
        let contract = storage_contract(body.to_vec());
        let hash = contract.script_hash();
        snapshot.contracts.add(hash, contract).unwrap();

        let mut container = StaticContainer::new(Vec::new());
        container.hashes = vec![hash];
        let mut invocation = ScriptBuilder::new();
        invocation.emit_push_int(42);
        container.witnesses = vec![Witness::new(invocation.to_vec(), Vec::new())];
        assert_eq!(verify_witnesses(&container, &snapshot), Ok(()));

        let mut invocation = ScriptBuilder::new();
        invocation.emit_push_int(41);
        container.witnesses = vec![Witness::new(invocation.to_vec(), Vec::new())];
        assert_eq!(
            verify_witnesses(&container, &snapshot),
            Err(VerificationError::Rejected(hash))
        );
    }

    #[test]
    fn test_verification_never_writes_parent_snapshot() {
        let mut snapshot = snapshot();
        let mut body = ScriptBuilder::new();
        body.emit_push_bytes(b"v")
            .emit_push_bytes(b"k")
            .emit_syscall(crate::domain::interop::STORAGE_GET_CONTEXT)
            .emit_syscall(crate::domain::interop::STORAGE_PUT)
            .emit(opcode::PUSHT);
        let contract = storage_contract(body.to_vec());
        let hash = contract.script_hash();
        snapshot.contracts.add(hash, contract).unwrap();

        let mut container = StaticContainer::new(Vec::new());
        container.hashes = vec![hash];
        container.witnesses = vec![Witness::default()];
        assert!(matches!(
            verify_witnesses(&container, &snapshot),
            Err(VerificationError::Fault { source: VmError::StorageDenied(_), .. })
        ));
        assert!(snapshot.storages.find(&[]).unwrap().is_empty());
    }
}
