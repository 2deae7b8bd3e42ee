use async_trait::async_trait;
use itertools::Itertools;
use kaspa_bip32::{DerivationPath, ExtendedPrivateKey, SecretKey, secp256k1};
use kaspa_consensus_core::hashing::sighash::{SigHashReusedValuesUnsync, calc_schnorr_signature_hash};
use kaspa_consensus_core::hashing::sighash_type::SIG_HASH_ALL;
use kaspa_consensus_core::sign::Signed;
use kaspa_consensus_core::tx::{ScriptPublicKey, SignableTransaction, Transaction, TransactionInput, TransactionOutput, UtxoEntry};
use kernel_common::errors::{ErrorKind, KernelResult};
use kernel_common::model::PendingTx;
use kernel_common::traits::{CredentialStore, Session};
use std::collections::BTreeMap;
use std::iter::once;
use std::str::FromStr;
use std::sync::Arc;

const SINGLE_SIGNER_PURPOSE: u32 = 44;
const KASPA_COIN_TYPE: u32 = 111111;

/// Single-signer master key derivation path, `m/44'/111111'/0'` (§4.6).
fn master_key_path() -> DerivationPath {
    format!("m/{SINGLE_SIGNER_PURPOSE}'/{KASPA_COIN_TYPE}'/0'")
        .parse()
        .expect("hardcoded derivation path string is always valid")
}

pub struct SignedPayload {
    pub serialized_hex: String,
    pub precomputed_txid: Option<String>,
}

/// Black-box signer contract (§4.6): derives keys, signs every input, and
/// must never leak mnemonic/private-key material in any observable output.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, tx: &PendingTx) -> KernelResult<SignedPayload>;
}

pub struct KaspaSigner {
    credential_store: Arc<dyn CredentialStore>,
}

impl KaspaSigner {
    pub fn new(credential_store: Arc<dyn CredentialStore>) -> Self {
        Self { credential_store }
    }

    fn derive_private_key(session: &Session) -> KernelResult<ExtendedPrivateKey<SecretKey>> {
        // `to_seed` takes the optional BIP-39 passphrase, not a password for
        // the key file itself; the credential store already unlocked that.
        let mnemonic = kaspa_bip32::Mnemonic::new(session.mnemonic.as_str(), kaspa_bip32::Language::English)
            .map_err(|e| ErrorKind::SignFailed(format!("invalid mnemonic: {e}")))?;
        let seed = mnemonic.to_seed(session.passphrase.as_deref().unwrap_or(""));
        let master = ExtendedPrivateKey::<SecretKey>::new(seed)
            .map_err(|e| ErrorKind::SignFailed(format!("key derivation failed: {e}")))?;

        let path = DerivationPath::from_str(&session.derivation_path).unwrap_or_else(|_| master_key_path());
        master.derive_path(&path).map_err(|e| ErrorKind::SignFailed(format!("path derivation failed: {e}")))
    }

    fn build_signable_transaction(tx: &PendingTx) -> KernelResult<SignableTransaction> {
        let mut inputs = Vec::with_capacity(tx.inputs.len());
        let mut entries = Vec::with_capacity(tx.inputs.len());
        for utxo in &tx.inputs {
            let previous_outpoint = kaspa_consensus_core::tx::TransactionOutpoint::new(
                kaspa_hashes::Hash::from_str(&utxo.txid).map_err(|e| ErrorKind::SignFailed(format!("bad txid: {e}")))?,
                utxo.output_index,
            );
            inputs.push(TransactionInput::new(previous_outpoint, vec![], 0, 1));

            let script_bytes = hex::decode(&utxo.script_public_key).map_err(|e| ErrorKind::SignFailed(format!("bad script hex: {e}")))?;
            entries.push(Some(UtxoEntry::new(
                utxo.amount,
                ScriptPublicKey::from_vec(utxo.script_version, script_bytes),
                utxo.block_daa_score,
                utxo.is_coinbase,
            )));
        }

        let mut outputs: Vec<TransactionOutput> = tx
            .outputs
            .iter()
            .map(|(address, amount)| recipient_output(address, *amount))
            .collect::<KernelResult<Vec<_>>>()?;
        if let Some((address, amount)) = &tx.change {
            outputs.push(recipient_output(address, *amount)?);
        }

        let transaction = Transaction::new(0, inputs, outputs, 0, Default::default(), 0, vec![]);
        Ok(SignableTransaction::with_entries(transaction, entries.into_iter().map(|e| e.expect("entry populated above")).collect()))
    }

    fn sign_with_key(mut signable: SignableTransaction, private_key: [u8; 32]) -> KernelResult<Signed> {
        let schnorr_key = secp256k1::Keypair::from_seckey_slice(secp256k1::SECP256K1, &private_key)
            .map_err(|e| ErrorKind::SignFailed(format!("invalid private key: {e}")))?;
        let schnorr_public_key = schnorr_key.public_key().x_only_public_key().0;
        let own_script = once(0x20u8).chain(schnorr_public_key.serialize()).chain(once(0xac)).collect_vec();

        let mut map = BTreeMap::new();
        map.insert(own_script, schnorr_key);

        let reused_values = SigHashReusedValuesUnsync::new();
        for i in 0..signable.tx.inputs.len() {
            let script = signable.entries[i].as_ref().expect("entry populated").script_public_key.script().to_vec();
            let Some(key) = map.get(&script) else {
                return Err(ErrorKind::SignFailed("input script does not match the derived key".to_string()));
            };
            let sig_hash = calc_schnorr_signature_hash(&signable.as_verifiable(), i, SIG_HASH_ALL, &reused_values);
            let msg = secp256k1::Message::from_digest_slice(sig_hash.as_bytes().as_slice())
                .map_err(|e| ErrorKind::SignFailed(format!("bad sighash: {e}")))?;
            let sig: [u8; 64] = *key.sign_schnorr(msg).as_ref();
            signable.tx.inputs[i].signature_script = once(65u8).chain(sig).chain([SIG_HASH_ALL.to_u8()]).collect();
        }

        Ok(Signed::Fully(signable))
    }
}

fn recipient_output(address: &str, amount: u64) -> KernelResult<TransactionOutput> {
    let parsed = kaspa_addresses::Address::try_from(address).map_err(|e| ErrorKind::SignFailed(format!("bad output address: {e}")))?;
    let script = kaspa_txscript::pay_to_address_script(&parsed);
    Ok(TransactionOutput::new(amount, script))
}

#[async_trait]
impl Signer for KaspaSigner {
    async fn sign(&self, tx: &PendingTx) -> KernelResult<SignedPayload> {
        let session = self.credential_store.get_session().await.ok_or(ErrorKind::WalletLocked)?;

        let extended_private_key = Self::derive_private_key(&session)?;
        let secret_bytes = extended_private_key.private_key().secret_bytes();
        drop(extended_private_key);

        let signable = Self::build_signable_transaction(tx)?;
        let signed = Self::sign_with_key(signable, secret_bytes)?;
        match signed {
            Signed::Fully(signed_tx) => {
                let txid = signed_tx.tx.id().to_string();
                let serialized = serde_json::to_string(&signed_tx.tx).map_err(|e| ErrorKind::SignFailed(e.to_string()))?;
                Ok(SignedPayload { serialized_hex: serialized, precomputed_txid: Some(txid) })
            }
            Signed::Partially(_) => Err(ErrorKind::SignFailed("transaction requires additional signatures".to_string())),
        }
    }
}
