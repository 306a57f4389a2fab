#![no_std]
use soroban_sdk::{
    contract, contractclient, contracterror, contractimpl, contracttype, log, symbol_short,
    token, Address, Env, String, Symbol,
};

// ============================================================
// CONSTANTS
// ============================================================

/// Maximum royalty rate accepted by the capsule collection, in basis points.
pub const MAX_ROYALTY_BPS: u32 = 10_000;

/// How many ledgers the reserve allowance stays live after construction
/// (about a month at 5s/ledger, below every network's max entry TTL).
const RESERVE_ALLOWANCE_TTL: u32 = 518_400;

// ============================================================
// ERRORS
// ============================================================

#[contracterror]
#[derive(Clone, Debug, Copy, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    MintingDisabled = 4,
    IncorrectTaxAmount = 5,
    AlreadyMinted = 6,
    SweepReserveAsset = 7,
    InvalidConfig = 8,
}

// ============================================================
// STORAGE
// ============================================================

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Governor,           // Address - sole admin principal, fixed at construction
    MintEnabled,        // bool - mint gate, false until toggled on
    CapsuleMinter,      // Address - Vault Protocol minter instance
    Collection,         // Address - capsule collection registered at construction
    Stablecoin,         // Address - reserve asset backing every outstanding capsule
    NativeToken,        // Address - asset the mint tax is paid in
    MaxUnits,           // u32 - immutable supply cap
    UnitFaceValue,      // i128 - stablecoin escrowed per capsule
    MintTax,            // i128 - exact fee per mint, forwarded to the minter
    HasMinted(Address), // bool - participation ledger, only ever set to true
}

// ============================================================
// VAULT PROTOCOL CAPABILITIES
// ============================================================

/// Minting side of the external Vault Protocol. The minter custodies one
/// stablecoin escrow per capsule and owns the unit id counter.
#[contractclient(name = "CapsuleMinterClient")]
pub trait CapsuleMinter {
    /// Registers a new size-locked collection owned by `controller` and
    /// returns its address. The minter refuses to resize it afterwards.
    fn create_collection(env: Env, controller: Address, size: u32) -> Address;

    /// Mints the next capsule in `collection` to `to`, drawing
    /// `escrow_amount` of `escrow_token` from `controller` (via allowance)
    /// into the capsule's escrow. Returns the assigned unit id.
    fn mint_capsule(
        env: Env,
        collection: Address,
        controller: Address,
        to: Address,
        escrow_token: Address,
        escrow_amount: i128,
    ) -> u64;

    /// Burns `unit_id` after checking `owner` against the collection's
    /// records, releasing the escrow back to the registering controller.
    fn burn_capsule(env: Env, collection: Address, owner: Address, unit_id: u64);
}

/// Configuration side of the collection created at construction.
#[contractclient(name = "CapsuleCollectionClient")]
pub trait CapsuleCollection {
    fn transfer_ownership(env: Env, new_owner: Address);
    fn set_metadata_authority(env: Env, authority: Address);
    fn set_base_uri(env: Env, uri: String);
    fn set_royalty_config(env: Env, receiver: Address, rate_bps: u32);
}

// ============================================================
// EVENTS
// ============================================================

mod events {
    use super::*;

    pub const MINT_TOGGLED: Symbol = symbol_short!("mint_tgl");
    pub const MINTED: Symbol = symbol_short!("minted");
    pub const BURNT: Symbol = symbol_short!("burnt");

    pub fn emit_mint_toggled(env: &Env, enabled: bool) {
        env.events().publish((MINT_TOGGLED,), enabled);
    }

    pub fn emit_minted(env: &Env, participant: &Address, unit_id: u64) {
        env.events().publish((MINTED, participant.clone()), unit_id);
    }

    pub fn emit_burnt(env: &Env, owner: &Address, unit_id: u64) {
        env.events().publish((BURNT, owner.clone()), unit_id);
    }
}

// ============================================================
// CONTROLLER
// ============================================================

#[contract]
pub struct KidCapsule;

#[contractimpl]
impl KidCapsule {
    /// One-time construction: stores the configuration, registers a
    /// size-locked collection of exactly `max_units` with the Vault
    /// Protocol minter, and grants the minter a stablecoin allowance equal
    /// to the full reserve (`max_units * unit_face_value`). That is the
    /// only allowance-granting call in the contract's lifetime.
    ///
    /// The gate starts off and the participation ledger empty; no mint or
    /// burn is reachable before this completes.
    pub fn initialize(
        env: Env,
        governor: Address,
        capsule_minter: Address,
        stablecoin: Address,
        native_token: Address,
        max_units: u32,
        unit_face_value: i128,
        mint_tax: i128,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Governor) {
            return Err(Error::AlreadyInitialized);
        }
        if max_units == 0 || unit_face_value <= 0 || mint_tax < 0 {
            return Err(Error::InvalidConfig);
        }
        let reserve = (max_units as i128)
            .checked_mul(unit_face_value)
            .ok_or(Error::InvalidConfig)?;

        let storage = env.storage().instance();
        storage.set(&DataKey::Governor, &governor);
        storage.set(&DataKey::MintEnabled, &false);
        storage.set(&DataKey::CapsuleMinter, &capsule_minter);
        storage.set(&DataKey::Stablecoin, &stablecoin);
        storage.set(&DataKey::NativeToken, &native_token);
        storage.set(&DataKey::MaxUnits, &max_units);
        storage.set(&DataKey::UnitFaceValue, &unit_face_value);
        storage.set(&DataKey::MintTax, &mint_tax);

        let this = env.current_contract_address();

        // Irreversible: the minter locks the collection size once created.
        let collection =
            CapsuleMinterClient::new(&env, &capsule_minter).create_collection(&this, &max_units);
        storage.set(&DataKey::Collection, &collection);

        let live_until = env.ledger().sequence().saturating_add(RESERVE_ALLOWANCE_TTL);
        token::Client::new(&env, &stablecoin).approve(&this, &capsule_minter, &reserve, &live_until);

        log!(&env, "kid capsule initialized: cap={}, reserve={}", max_units, reserve);
        Ok(())
    }

    /// Mints one capsule to `participant`. Open to anyone, once per
    /// address, while the gate is on and the exact mint tax is paid.
    ///
    /// Collateral and the supply cap are not pre-checked here: the minter
    /// draws one face value from this contract's stablecoin balance and
    /// fails the whole call when the balance is short or the collection is
    /// sealed. Those failures propagate verbatim.
    pub fn mint(env: Env, participant: Address, tax_paid: i128) -> Result<u64, Error> {
        participant.require_auth();

        if !Self::is_mint_enabled(env.clone()) {
            return Err(Error::MintingDisabled);
        }
        let tax: i128 = read(&env, &DataKey::MintTax)?;
        if tax_paid != tax {
            return Err(Error::IncorrectTaxAmount);
        }
        let ledger_key = DataKey::HasMinted(participant.clone());
        if env.storage().persistent().get(&ledger_key).unwrap_or(false) {
            return Err(Error::AlreadyMinted);
        }
        env.storage().persistent().set(&ledger_key, &true);

        let minter: Address = read(&env, &DataKey::CapsuleMinter)?;
        let this = env.current_contract_address();

        // The tax goes to the minter's fee sink; it is never collateral.
        if tax > 0 {
            let native: Address = read(&env, &DataKey::NativeToken)?;
            token::Client::new(&env, &native).transfer(&participant, &minter, &tax);
        }

        let collection: Address = read(&env, &DataKey::Collection)?;
        let stablecoin: Address = read(&env, &DataKey::Stablecoin)?;
        let face_value: i128 = read(&env, &DataKey::UnitFaceValue)?;
        let unit_id = CapsuleMinterClient::new(&env, &minter).mint_capsule(
            &collection,
            &this,
            &participant,
            &stablecoin,
            &face_value,
        );

        events::emit_minted(&env, &participant, unit_id);
        Ok(unit_id)
    }

    /// Burns `unit_id` and forwards its released escrow (one face value)
    /// to `owner`. Ownership is checked by the Vault Protocol, not here.
    ///
    /// The caller's participation ledger entry is left in place: an address
    /// that minted and burned cannot mint again.
    pub fn burn(env: Env, owner: Address, unit_id: u64) -> Result<(), Error> {
        owner.require_auth();

        let minter: Address = read(&env, &DataKey::CapsuleMinter)?;
        let collection: Address = read(&env, &DataKey::Collection)?;
        CapsuleMinterClient::new(&env, &minter).burn_capsule(&collection, &owner, &unit_id);

        let stablecoin: Address = read(&env, &DataKey::Stablecoin)?;
        let face_value: i128 = read(&env, &DataKey::UnitFaceValue)?;
        token::Client::new(&env, &stablecoin).transfer(
            &env.current_contract_address(),
            &owner,
            &face_value,
        );

        events::emit_burnt(&env, &owner, unit_id);
        Ok(())
    }

    /// Flips the mint gate. Always emits the new value, even when called
    /// twice in a row.
    pub fn toggle_mint(env: Env, caller: Address) -> Result<bool, Error> {
        Self::require_governor(&env, &caller)?;
        let enabled = !Self::is_mint_enabled(env.clone());
        env.storage().instance().set(&DataKey::MintEnabled, &enabled);
        events::emit_mint_toggled(&env, enabled);
        Ok(enabled)
    }

    /// Hands the collection itself to a new owner. Pure forwarding; the
    /// Governor of this controller never changes.
    pub fn transfer_collection_ownership(
        env: Env,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), Error> {
        Self::require_governor(&env, &caller)?;
        let collection: Address = read(&env, &DataKey::Collection)?;
        CapsuleCollectionClient::new(&env, &collection).transfer_ownership(&new_owner);
        Ok(())
    }

    pub fn update_meta_authority(env: Env, caller: Address, authority: Address) -> Result<(), Error> {
        Self::require_governor(&env, &caller)?;
        let collection: Address = read(&env, &DataKey::Collection)?;
        CapsuleCollectionClient::new(&env, &collection).set_metadata_authority(&authority);
        Ok(())
    }

    pub fn update_base_uri(env: Env, caller: Address, uri: String) -> Result<(), Error> {
        Self::require_governor(&env, &caller)?;
        let collection: Address = read(&env, &DataKey::Collection)?;
        CapsuleCollectionClient::new(&env, &collection).set_base_uri(&uri);
        Ok(())
    }

    /// Forwards a royalty update verbatim; the collection validates the
    /// rate (<= 10000 bps) and fails the whole call otherwise.
    pub fn update_royalty_config(
        env: Env,
        caller: Address,
        receiver: Address,
        rate_bps: u32,
    ) -> Result<(), Error> {
        Self::require_governor(&env, &caller)?;
        let collection: Address = read(&env, &DataKey::Collection)?;
        CapsuleCollectionClient::new(&env, &collection).set_royalty_config(&receiver, &rate_bps);
        Ok(())
    }

    /// Recovers the full balance of a stray token to the Governor and
    /// returns the amount moved. The reserve stablecoin is refused: that
    /// balance is the live collateral backing outstanding capsules.
    pub fn sweep(env: Env, caller: Address, token_addr: Address) -> Result<i128, Error> {
        Self::require_governor(&env, &caller)?;
        let stablecoin: Address = read(&env, &DataKey::Stablecoin)?;
        if token_addr == stablecoin {
            return Err(Error::SweepReserveAsset);
        }
        let client = token::Client::new(&env, &token_addr);
        let balance = client.balance(&env.current_contract_address());
        if balance > 0 {
            client.transfer(&env.current_contract_address(), &caller, &balance);
        }
        log!(&env, "swept {} of {}", balance, token_addr);
        Ok(balance)
    }

    // ============================================================
    // READ VIEWS
    // ============================================================

    pub fn governor(env: Env) -> Result<Address, Error> {
        read(&env, &DataKey::Governor)
    }

    pub fn is_mint_enabled(env: Env) -> bool {
        env.storage().instance().get(&DataKey::MintEnabled).unwrap_or(false)
    }

    pub fn max_units(env: Env) -> Result<u32, Error> {
        read(&env, &DataKey::MaxUnits)
    }

    pub fn capsule_collection(env: Env) -> Result<Address, Error> {
        read(&env, &DataKey::Collection)
    }

    pub fn capsule_minter(env: Env) -> Result<Address, Error> {
        read(&env, &DataKey::CapsuleMinter)
    }

    pub fn unit_face_value(env: Env) -> Result<i128, Error> {
        read(&env, &DataKey::UnitFaceValue)
    }

    pub fn mint_tax(env: Env) -> Result<i128, Error> {
        read(&env, &DataKey::MintTax)
    }

    pub fn has_minted(env: Env, participant: Address) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::HasMinted(participant))
            .unwrap_or(false)
    }

    // ============================================================
    // INTERNAL HELPERS
    // ============================================================

    fn require_governor(env: &Env, caller: &Address) -> Result<(), Error> {
        caller.require_auth();
        let governor: Address = read(env, &DataKey::Governor)?;
        if *caller != governor {
            return Err(Error::NotAuthorized);
        }
        Ok(())
    }
}

fn read<T>(env: &Env, key: &DataKey) -> Result<T, Error>
where
    T: soroban_sdk::TryFromVal<Env, soroban_sdk::Val>,
{
    env.storage().instance().get(key).ok_or(Error::NotInitialized)
}
