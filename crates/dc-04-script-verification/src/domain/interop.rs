//! # Interop Services
//!
//! Syscalls a script can make into the node. Names are matched exactly;
//! each `System.*` service also answers to its legacy `Neo.*` alias.

use super::engine::{ApplicationEngine, TriggerType};
use super::errors::{VmError, VmResult};
use super::prices::{self, costs};
use super::stack_item::{StackItem, StorageContext};
use dc_02_ledger::{StorageItem, StorageKey};
use num_bigint::BigInt;
use shared_crypto::{signature_contract_hash, PublicKey};
use shared_types::UInt160;
use tracing::info;

pub const CHECK_WITNESS: &str = "System.Runtime.CheckWitness";
pub const GET_TRIGGER: &str = "System.Runtime.GetTrigger";
pub const LOG: &str = "System.Runtime.Log";
pub const STORAGE_GET_CONTEXT: &str = "System.Storage.GetContext";
pub const STORAGE_GET: &str = "System.Storage.Get";
pub const STORAGE_PUT: &str = "System.Storage.Put";
pub const STORAGE_DELETE: &str = "System.Storage.Delete";
pub const BLOCKCHAIN_GET_HEIGHT: &str = "Neo.Blockchain.GetHeight";

pub const MAX_STORAGE_KEY_SIZE: usize = 1024;

const PUBLIC_KEY_LEN: usize = 33;

fn canonical(name: &str) -> Option<&'static str> {
    Some(match name {
        "System.Runtime.CheckWitness" | "Neo.Runtime.CheckWitness" => CHECK_WITNESS,
        "System.Runtime.GetTrigger" | "Neo.Runtime.GetTrigger" => GET_TRIGGER,
        "System.Runtime.Log" | "Neo.Runtime.Log" => LOG,
        "System.Storage.GetContext" | "Neo.Storage.GetContext" => STORAGE_GET_CONTEXT,
        "System.Storage.Get" | "Neo.Storage.Get" => STORAGE_GET,
        "System.Storage.Put" | "Neo.Storage.Put" => STORAGE_PUT,
        "System.Storage.Delete" | "Neo.Storage.Delete" => STORAGE_DELETE,
        "Neo.Blockchain.GetHeight" => BLOCKCHAIN_GET_HEIGHT,
        _ => return None,
    })
}

fn service(operand: &[u8]) -> VmResult<&'static str> {
    std::str::from_utf8(operand)
        .ok()
        .and_then(canonical)
        .ok_or_else(|| VmError::UnknownSyscall(String::from_utf8_lossy(operand).into_owned()))
}

impl ApplicationEngine<'_> {
    pub(crate) fn syscall_price(&self, operand: &[u8]) -> i64 {
        match service(operand) {
            Ok(CHECK_WITNESS) => costs::CHECK_WITNESS,
            Ok(STORAGE_GET) => costs::STORAGE_GET,
            Ok(STORAGE_DELETE) => costs::STORAGE_DELETE,
            Ok(STORAGE_PUT) => {
                // context on top, then key, then value
                let key = self.evaluation_stack.peek(1).and_then(StackItem::to_bytes);
                let value = self.evaluation_stack.peek(2).and_then(StackItem::to_bytes);
                match (key, value) {
                    (Ok(key), Ok(value)) => prices::storage_put_price(key.len() + value.len()),
                    _ => costs::DEFAULT,
                }
            }
            _ => costs::DEFAULT,
        }
    }

    pub(crate) fn syscall(&mut self, operand: &[u8]) -> VmResult<()> {
        match service(operand)? {
            CHECK_WITNESS => self.check_witness(),
            GET_TRIGGER => self.push_int(BigInt::from(self.trigger as u8)),
            LOG => self.log(),
            STORAGE_GET_CONTEXT => self.storage_get_context(),
            STORAGE_GET => self.storage_get(),
            STORAGE_PUT => self.storage_put(),
            STORAGE_DELETE => self.storage_delete(),
            BLOCKCHAIN_GET_HEIGHT => {
                let height = self.snapshot.height().unwrap_or(0);
                self.push_int(BigInt::from(height))
            }
            other => Err(VmError::UnknownSyscall(other.to_string())),
        }
    }

    /// True when the hash (or a key's signature contract) is among the
    /// container's script hashes for verifying.
    fn check_witness(&mut self) -> VmResult<()> {
        let data = self.pop_bytes()?;
        let hash = match data.len() {
            UInt160::LEN => {
                UInt160::from_slice(&data).map_err(|_| VmError::WrongType("script hash"))?
            }
            PUBLIC_KEY_LEN => {
                let key = PublicKey::from_bytes(&data)
                    .map_err(|_| VmError::WrongType("public key"))?;
                signature_contract_hash(&key)
            }
            _ => return Err(VmError::WrongType("script hash or public key")),
        };
        let hashes = self.container.script_hashes_for_verifying(self.snapshot)?;
        self.evaluation_stack.push(hashes.contains(&hash))
    }

    fn log(&mut self) -> VmResult<()> {
        let message = String::from_utf8_lossy(&self.pop_bytes()?).into_owned();
        let contract = self.current_script_hash()?;
        info!(%contract, %message, "Contract log");
        self.logs.push(message);
        Ok(())
    }

    fn storage_get_context(&mut self) -> VmResult<()> {
        let script_hash = self.current_script_hash()?;
        self.evaluation_stack
            .push(StackItem::StorageContext(StorageContext {
                script_hash,
                read_only: false,
            }))
    }

    /// Pop a context whose contract exists and declared storage.
    fn pop_storage_context(&mut self) -> VmResult<StorageContext> {
        let context = self.evaluation_stack.pop()?.to_storage_context()?;
        let contract = self
            .snapshot
            .contracts
            .try_get(&context.script_hash)?
            .ok_or(VmError::UnknownContract(context.script_hash))?;
        if !contract.has_storage() {
            return Err(VmError::StorageDenied("contract has no storage"));
        }
        Ok(context)
    }

    fn pop_writable_context(&mut self) -> VmResult<StorageContext> {
        if self.trigger != TriggerType::Application {
            return Err(VmError::StorageDenied("storage is read-only during verification"));
        }
        let context = self.pop_storage_context()?;
        if context.read_only {
            return Err(VmError::StorageDenied("context is read-only"));
        }
        Ok(context)
    }

    fn storage_get(&mut self) -> VmResult<()> {
        let context = self.pop_storage_context()?;
        let key = self.pop_bytes()?;
        let item = self
            .snapshot
            .storages
            .try_get(&StorageKey::new(context.script_hash, key))?;
        self.evaluation_stack
            .push(item.map(|item| item.value).unwrap_or_default())
    }

    fn storage_put(&mut self) -> VmResult<()> {
        let context = self.pop_writable_context()?;
        let key = self.pop_bytes()?;
        if key.len() > MAX_STORAGE_KEY_SIZE {
            return Err(VmError::StorageDenied("key longer than 1024 bytes"));
        }
        let value = self.pop_bytes()?;
        let key = StorageKey::new(context.script_hash, key);
        if let Some(existing) = self.snapshot.storages.try_get(&key)? {
            if existing.is_constant {
                return Err(VmError::StorageDenied("item is constant"));
            }
        }
        self.snapshot.storages.put(
            key,
            StorageItem {
                value,
                is_constant: false,
            },
        )?;
        Ok(())
    }

    fn storage_delete(&mut self) -> VmResult<()> {
        let context = self.pop_writable_context()?;
        let key = StorageKey::new(context.script_hash, self.pop_bytes()?);
        if let Some(existing) = self.snapshot.storages.try_get(&key)? {
            if existing.is_constant {
                return Err(VmError::StorageDenied("item is constant"));
            }
            self.snapshot.storages.delete(&key)?;
        }
        Ok(())
    }
}
