//! Tests for the vault engine running on the mock VM

#[cfg(test)]
mod tests {
    use odra::casper_types::U256;
    use odra::host::{Deployer, HostEnv, HostRef, NoArgs};
    use odra::prelude::*;
    use crate::math::wad;
    use crate::tokens::{
        CollateralToken, CollateralTokenHostRef, CollateralTokenInitArgs, Stablecoin, StablecoinHostRef,
        StablecoinInitArgs,
    };
    use crate::vaults::permit::PermitSignature;
    use crate::vaults::price_oracle::{PriceOracle, PriceOracleHostRef, PriceOracleInitArgs};
    use crate::vaults::vault_manager::{VaultManagerHostRef, VaultManagerInitArgs};
    use crate::vaults::{
        Action, BoostStep, DebtTransferred, PermitArgs, RiskParameter, VaultError, VaultManager, VaultParameters,
        VaultStatus,
    };

    const YEAR_MS: u64 = 31_536_000 * 1_000;

    /// Action constructors for batches known to encode
    mod batch {
        use super::*;

        fn ok(action: Result<Action, VaultError>) -> Action {
            match action {
                Ok(action) => action,
                Err(_) => panic!("encoding failed"),
            }
        }

        pub fn create_vault(owner: Address) -> Action {
            ok(Action::create_vault(owner))
        }

        pub fn add_collateral(vault_id: u64, amount: U256) -> Action {
            ok(Action::add_collateral(vault_id, amount))
        }

        pub fn remove_collateral(vault_id: u64, amount: U256) -> Action {
            ok(Action::remove_collateral(vault_id, amount))
        }

        pub fn borrow(vault_id: u64, amount: U256) -> Action {
            ok(Action::borrow(vault_id, amount))
        }

        pub fn repay(vault_id: u64, amount: U256) -> Action {
            ok(Action::repay(vault_id, amount))
        }

        pub fn get_debt_in(vault_id: u64, vault_manager: Address, dst_vault_id: u64, amount: U256) -> Action {
            ok(Action::get_debt_in(vault_id, vault_manager, dst_vault_id, amount))
        }

        pub fn close_position(vault_id: u64) -> Action {
            ok(Action::close_position(vault_id))
        }

        pub fn permit(args: PermitArgs) -> Action {
            ok(Action::permit(args))
        }
    }

    /// Test double for a stake-weighted boost source
    #[odra::module]
    pub struct MockBoostProxy {
        balances: Mapping<Address, U256>,
    }

    #[odra::module]
    impl MockBoostProxy {
        pub fn set_balance(&mut self, account: Address, balance: U256) {
            self.balances.set(&account, balance);
        }

        pub fn adjusted_balance_of(&self, account: Address) -> U256 {
            self.balances.get(&account).unwrap_or_default()
        }
    }

    struct Fixture {
        env: HostEnv,
        admin: Address,
        alice: Address,
        bob: Address,
        treasury: Address,
        stablecoin: StablecoinHostRef,
        collateral: CollateralTokenHostRef,
        oracle: PriceOracleHostRef,
        manager: VaultManagerHostRef,
    }

    fn tokens(value: u64) -> U256 {
        U256::from(value) * wad()
    }

    /// `value / 1000` tokens
    fn milli(value: u64) -> U256 {
        U256::from(value) * wad() / 1_000
    }

    fn pct(value: u64) -> U256 {
        U256::from(value) * wad() / 100
    }

    fn params() -> VaultParameters {
        VaultParameters {
            debt_ceiling: tokens(1_000_000),
            collateral_factor: pct(50),
            target_health_factor: pct(110),
            interest_rate: U256::zero(),
            liquidation_surcharge: pct(90),
            max_liquidation_discount: pct(10),
            borrow_fee: U256::zero(),
            repay_fee: U256::zero(),
            whitelisting_activated: false,
        }
    }

    /// Deploys an engine over the fixture's tokens and oracle, registers it
    /// as a stablecoin minter and lets alice and bob fund it
    #[allow(clippy::too_many_arguments)]
    fn deploy_engine(
        env: &HostEnv,
        admin: Address,
        users: [Address; 2],
        treasury: Address,
        stablecoin: &mut StablecoinHostRef,
        collateral: &mut CollateralTokenHostRef,
        oracle: &PriceOracleHostRef,
        params: VaultParameters,
    ) -> VaultManagerHostRef {
        env.set_caller(admin);
        let manager = VaultManager::deploy(
            env,
            VaultManagerInitArgs {
                stablecoin: stablecoin.address().clone(),
                collateral: collateral.address().clone(),
                oracle: oracle.address().clone(),
                treasury,
                params,
            },
        );
        stablecoin.set_minter(manager.address().clone(), true);
        for user in users {
            env.set_caller(user);
            collateral.approve(manager.address().clone(), U256::MAX);
        }
        env.set_caller(admin);
        manager
    }

    fn deploy_manager(f: &mut Fixture, params: VaultParameters) -> VaultManagerHostRef {
        deploy_engine(
            &f.env,
            f.admin,
            [f.alice, f.bob],
            f.treasury,
            &mut f.stablecoin,
            &mut f.collateral,
            &f.oracle,
            params,
        )
    }

    fn setup_with(params: VaultParameters) -> Fixture {
        let env = odra_test::env();
        let admin = env.get_account(0);
        let alice = env.get_account(1);
        let bob = env.get_account(2);
        let treasury = env.get_account(3);

        env.set_caller(admin);
        let mut stablecoin = Stablecoin::deploy(
            &env,
            StablecoinInitArgs {
                name: String::from("Vault USD"),
                symbol: String::from("VUSD"),
            },
        );
        let mut collateral = CollateralToken::deploy(
            &env,
            CollateralTokenInitArgs {
                name: String::from("Wrapped Ether"),
                symbol: String::from("WETH"),
                decimals: 18,
            },
        );
        let mut oracle = PriceOracle::deploy(&env, PriceOracleInitArgs { max_staleness: 3_600 });
        oracle.set_rate(tokens(2));
        collateral.mint(alice, tokens(1_000));
        collateral.mint(bob, tokens(1_000));

        let manager = deploy_engine(
            &env,
            admin,
            [alice, bob],
            treasury,
            &mut stablecoin,
            &mut collateral,
            &oracle,
            params,
        );
        Fixture {
            env,
            admin,
            alice,
            bob,
            treasury,
            stablecoin,
            collateral,
            oracle,
            manager,
        }
    }

    fn setup() -> Fixture {
        setup_with(params())
    }

    fn set_price(f: &mut Fixture, price: U256) {
        f.env.set_caller(f.admin);
        f.oracle.set_rate(price);
    }

    /// Opens a vault for `owner` with `collateral` and `debt` in one batch
    fn open(f: &mut Fixture, owner: Address, collateral: U256, debt: U256) -> u64 {
        let vault_id = f.manager.vault_count() + 1;
        let mut actions = vec![batch::create_vault(owner), batch::add_collateral(vault_id, collateral)];
        if !debt.is_zero() {
            actions.push(batch::borrow(vault_id, debt));
        }
        f.env.set_caller(owner);
        f.manager.apply(actions, owner, owner);
        vault_id
    }

    #[test]
    fn test_open_vault_and_borrow() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(5));

        let vault = f.manager.vault(vault_id).unwrap();
        assert_eq!(vault.owner, alice);
        assert_eq!(vault.collateral_amount, tokens(10));
        assert_eq!(vault.status, VaultStatus::Active);
        assert_eq!(f.manager.vault_debt(vault_id), tokens(5));
        assert_eq!(f.manager.total_debt(), tokens(5));
        assert_eq!(f.manager.total_normalized_debt(), vault.normalized_debt);

        assert_eq!(f.stablecoin.balance_of(alice), tokens(5));
        assert_eq!(f.collateral.balance_of(alice), tokens(990));
        assert_eq!(f.collateral.balance_of(f.manager.address().clone()), tokens(10));
        // 20 of collateral value at cf 0.5 against 5 of debt
        assert_eq!(f.manager.health_factor(vault_id), tokens(2));
        assert!(f.env.emitted(&f.manager, "VaultCreated"));
    }

    #[test]
    fn test_borrow_boundary_is_strict() {
        let mut f = setup();
        let alice = f.alice;
        // 2 units at 2.0 with cf 0.5: borrowing power of exactly 2.0
        let vault_id = open(&mut f, alice, tokens(2), U256::zero());

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, tokens(2))], alice, alice),
            Err(VaultError::InsufficientCollateral.into())
        );
        f.manager.apply(vec![batch::borrow(vault_id, milli(1_999))], alice, alice);
        assert_eq!(f.stablecoin.balance_of(alice), milli(1_999));
    }

    #[test]
    fn test_debt_ceiling_rolls_back_whole_batch() {
        let mut f = setup_with(VaultParameters { debt_ceiling: tokens(100), ..params() });
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(500), tokens(60));

        let collateral_before = f.collateral.balance_of(alice);
        let stablecoin_before = f.stablecoin.balance_of(alice);
        let vault_before = f.manager.vault(vault_id).unwrap();

        // 60 + 40.0001 = 100.0001 > 100
        let over = tokens(40) + U256::from(100_000_000_000_000u64);
        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(
                vec![batch::add_collateral(vault_id, tokens(10)), batch::borrow(vault_id, over)],
                alice,
                alice,
            ),
            Err(VaultError::DebtCeilingExceeded.into())
        );
        assert_eq!(f.collateral.balance_of(alice), collateral_before);
        assert_eq!(f.stablecoin.balance_of(alice), stablecoin_before);
        assert_eq!(f.manager.vault(vault_id).unwrap(), vault_before);
        assert_eq!(f.manager.total_debt(), tokens(60));

        f.manager.apply(vec![batch::borrow(vault_id, tokens(40))], alice, alice);
        assert_eq!(f.manager.total_debt(), tokens(100));
    }

    #[test]
    fn test_add_then_remove_collateral_round_trip() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(3));
        let before = f.manager.vault(vault_id).unwrap();

        f.env.set_caller(alice);
        f.manager.apply(vec![batch::add_collateral(vault_id, tokens(7))], alice, alice);
        assert_eq!(f.manager.vault(vault_id).unwrap().collateral_amount, tokens(17));
        f.manager.apply(vec![batch::remove_collateral(vault_id, tokens(7))], alice, alice);

        let after = f.manager.vault(vault_id).unwrap();
        assert_eq!(after.collateral_amount, before.collateral_amount);
        assert_eq!(after.normalized_debt, before.normalized_debt);
        assert_eq!(f.collateral.balance_of(alice), tokens(990));
    }

    #[test]
    fn test_temporary_insolvency_inside_batch() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(4));

        // Removing 6 alone leaves 8 of value against 4 of debt: insolvent
        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::remove_collateral(vault_id, tokens(6))], alice, alice),
            Err(VaultError::InsufficientCollateral.into())
        );

        let receipt = f.manager.apply(
            vec![batch::remove_collateral(vault_id, tokens(6)), batch::repay(vault_id, tokens(2))],
            alice,
            alice,
        );
        assert_eq!(receipt.collateral_sent, tokens(6));
        assert_eq!(receipt.stablecoin_burned, tokens(2));
        assert_eq!(f.manager.vault_debt(vault_id), tokens(2));
        assert_eq!(f.stablecoin.balance_of(alice), tokens(2));
    }

    #[test]
    fn test_paused_engine_rejects_everything() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(4));

        f.env.set_caller(f.admin);
        f.manager.toggle_pause();
        assert!(f.manager.is_paused());

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::add_collateral(vault_id, tokens(1))], alice, alice),
            Err(VaultError::Paused.into())
        );
        assert_eq!(f.manager.try_create_vault(alice), Err(VaultError::Paused.into()));
        assert_eq!(
            f.manager.try_liquidate(vec![vault_id], vec![tokens(1)], alice, alice),
            Err(VaultError::Paused.into())
        );

        f.env.set_caller(f.admin);
        f.manager.toggle_pause();
        f.env.set_caller(alice);
        f.manager.apply(vec![batch::add_collateral(vault_id, tokens(1))], alice, alice);
    }

    #[test]
    fn test_whitelist_gates_vault_owners() {
        let mut f = setup_with(VaultParameters { whitelisting_activated: true, ..params() });
        let alice = f.alice;

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::create_vault(alice)], alice, alice),
            Err(VaultError::NotWhitelisted.into())
        );
        assert_eq!(f.manager.try_create_vault(alice), Err(VaultError::NotWhitelisted.into()));

        f.env.set_caller(f.admin);
        f.manager.set_whitelisted(alice, true);
        let vault_id = open(&mut f, alice, tokens(10), tokens(1));
        assert_eq!(f.manager.owner_of(vault_id), alice);

        // Delisting blocks further changes to the vault
        f.env.set_caller(f.admin);
        f.manager.set_whitelisted(alice, false);
        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, tokens(1))], alice, alice),
            Err(VaultError::NotWhitelisted.into())
        );

        f.env.set_caller(f.admin);
        f.manager.toggle_whitelisting();
        assert!(!f.manager.whitelisting_activated());
        f.env.set_caller(alice);
        f.manager.apply(vec![batch::borrow(vault_id, tokens(1))], alice, alice);
    }

    #[test]
    fn test_repay_more_than_owed_fails() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(5));

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::repay(vault_id, tokens(6))], alice, alice),
            Err(VaultError::OverRepayment.into())
        );
        f.manager.apply(vec![batch::repay(vault_id, tokens(5))], alice, alice);
        assert_eq!(f.manager.vault_debt(vault_id), U256::zero());
        assert_eq!(f.manager.total_normalized_debt(), U256::zero());
        assert_eq!(f.manager.health_factor(vault_id), U256::MAX);
    }

    #[test]
    fn test_zero_amounts_and_empty_batches_fail() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), U256::zero());

        f.env.set_caller(alice);
        assert_eq!(f.manager.try_apply(vec![], alice, alice), Err(VaultError::EmptyBatch.into()));
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, U256::zero())], alice, alice),
            Err(VaultError::ZeroAmount.into())
        );
    }

    #[test]
    fn test_only_owner_or_operator_may_withdraw() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(10), U256::zero());

        f.env.set_caller(bob);
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, tokens(1))], bob, bob),
            Err(VaultError::NotOwnerOrApproved.into())
        );
        assert_eq!(
            f.manager.try_apply(vec![batch::remove_collateral(vault_id, tokens(1))], bob, bob),
            Err(VaultError::NotOwnerOrApproved.into())
        );
        // Anyone may top up a vault
        f.manager.apply(vec![batch::add_collateral(vault_id, tokens(1))], bob, bob);

        f.env.set_caller(alice);
        f.manager.set_approval_for_all(bob, true);
        assert!(f.manager.is_approved_for_all(alice, bob));

        f.env.set_caller(bob);
        f.manager.apply(vec![batch::borrow(vault_id, tokens(2))], bob, bob);
        assert_eq!(f.stablecoin.balance_of(bob), tokens(2));
        assert_eq!(f.manager.vault_debt(vault_id), tokens(2));
    }

    #[test]
    fn test_close_position_and_closed_vaults() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(4));

        f.env.set_caller(alice);
        let receipt = f.manager.apply(vec![batch::close_position(vault_id)], alice, alice);
        assert_eq!(receipt.stablecoin_burned, tokens(4));
        assert_eq!(receipt.collateral_sent, tokens(10));
        assert_eq!(f.collateral.balance_of(alice), tokens(1_000));
        assert_eq!(f.stablecoin.balance_of(alice), U256::zero());

        let vault = f.manager.vault(vault_id).unwrap();
        assert_eq!(vault.status, VaultStatus::Closed);
        assert_eq!(vault.collateral_amount, U256::zero());
        assert_eq!(f.manager.total_normalized_debt(), U256::zero());

        assert_eq!(
            f.manager.try_apply(vec![batch::add_collateral(vault_id, tokens(1))], alice, alice),
            Err(VaultError::AlreadyClosed.into())
        );
        assert_eq!(
            f.manager.try_apply(vec![batch::add_collateral(99, tokens(1))], alice, alice),
            Err(VaultError::VaultNotFound.into())
        );
    }

    #[test]
    fn test_dust_debt_is_rejected() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), U256::zero());

        f.env.set_caller(f.admin);
        f.manager.set_dusts(tokens(1), tokens(1), U256::zero());

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, milli(500))], alice, alice),
            Err(VaultError::DustViolation.into())
        );
        f.manager.apply(vec![batch::borrow(vault_id, tokens(2))], alice, alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::repay(vault_id, milli(1_500))], alice, alice),
            Err(VaultError::DustViolation.into())
        );
        f.manager.apply(vec![batch::repay(vault_id, tokens(2))], alice, alice);
    }

    #[test]
    fn test_fees_accrue_to_surplus() {
        let mut f = setup_with(VaultParameters { borrow_fee: pct(1), repay_fee: pct(2), ..params() });
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(100), tokens(50));

        // 1% of 50 is added to the debt
        assert_eq!(f.manager.vault_debt(vault_id), milli(50_500));
        assert_eq!(f.stablecoin.balance_of(alice), tokens(50));
        assert_eq!(f.manager.surplus(), milli(500));

        f.env.set_caller(alice);
        let receipt = f.manager.apply(vec![batch::repay(vault_id, tokens(10))], alice, alice);
        // 2% of 10 is charged on top
        assert_eq!(receipt.stablecoin_burned, milli(10_200));
        assert_eq!(f.manager.surplus(), milli(700));
        assert_eq!(f.manager.vault_debt(vault_id), milli(40_500));

        f.manager.accrue_interest_to_treasury();
        assert_eq!(f.stablecoin.balance_of(f.treasury), milli(700));
        assert_eq!(f.manager.surplus(), U256::zero());
    }

    #[test]
    fn test_interest_accrues_and_rate_change_is_not_retroactive() {
        // ~5% a year compounded per second
        let rate = U256::from(1_547_125_957_863_212_448u128);
        let mut f = setup_with(VaultParameters { interest_rate: rate, ..params() });
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(1_000), tokens(100));

        let start = f.manager.interest_accumulator();
        f.env.advance_block_time(YEAR_MS);
        let after_year = f.manager.interest_accumulator();
        assert!(after_year > start);

        let debt = f.manager.vault_debt(vault_id);
        let expected = tokens(105);
        let tolerance = milli(1);
        assert!(debt > expected - tolerance && debt < expected + tolerance);

        f.env.set_caller(f.admin);
        f.manager.set_risk_parameter(RiskParameter::InterestRate, U256::zero());
        assert_eq!(f.manager.interest_rate(), U256::zero());
        // The year under the old rate was booked before the change
        assert!(f.manager.surplus() > tokens(4));

        f.env.advance_block_time(YEAR_MS);
        assert_eq!(f.manager.vault_debt(vault_id), debt);
        assert_eq!(f.manager.interest_accumulator(), after_year);

        f.manager.accrue_interest_to_treasury();
        let minted = f.stablecoin.balance_of(f.treasury);
        assert!(minted > tokens(4) && minted < tokens(6));
    }

    #[test]
    fn test_stale_oracle_blocks_borrowing() {
        let mut f = setup();
        let alice = f.alice;
        let vault_id = open(&mut f, alice, tokens(10), tokens(1));

        f.env.advance_block_time(3_601 * 1_000);
        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_apply(vec![batch::borrow(vault_id, tokens(1))], alice, alice),
            Err(VaultError::StaleOrInvalidPrice.into())
        );
        // Repaying needs no price
        f.manager.apply(vec![batch::repay(vault_id, tokens(1))], alice, alice);

        set_price(&mut f, tokens(2));
        f.env.set_caller(alice);
        f.manager.apply(vec![batch::borrow(vault_id, tokens(1))], alice, alice);
    }

    #[test]
    fn test_permit_grants_approval_once() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let deadline = f.env.block_time() / 1_000 + 3_600;

        let digest = f.manager.permit_digest(alice, bob, true, 0, deadline);
        let signature = f.env.sign_message(&digest, &alice);
        let args = PermitArgs {
            owner: alice,
            spender: bob,
            approved: true,
            nonce: 0,
            deadline,
            signature: PermitSignature {
                public_key: Some(f.env.public_key(&alice)),
                signature,
            },
        };

        f.env.set_caller(bob);
        f.manager.permit(args.clone());
        assert!(f.manager.is_approved_for_all(alice, bob));
        assert_eq!(f.manager.nonce(alice), 1);

        assert_eq!(f.manager.try_permit(args.clone()), Err(VaultError::ReplayedSignature.into()));
        // Same payload inside a batch
        assert_eq!(
            f.manager.try_apply(vec![batch::permit(args)], bob, bob),
            Err(VaultError::ReplayedSignature.into())
        );
    }

    #[test]
    fn test_permit_rejects_expired_and_forged_signatures() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let deadline = f.env.block_time() / 1_000 + 60;

        let digest = f.manager.permit_digest(alice, bob, true, 0, deadline);
        let forged = PermitArgs {
            owner: alice,
            spender: bob,
            approved: true,
            nonce: 0,
            deadline,
            signature: PermitSignature {
                public_key: Some(f.env.public_key(&bob)),
                signature: f.env.sign_message(&digest, &bob),
            },
        };
        f.env.set_caller(bob);
        assert_eq!(f.manager.try_permit(forged), Err(VaultError::InvalidSignature.into()));

        let valid = PermitArgs {
            owner: alice,
            spender: bob,
            approved: true,
            nonce: 0,
            deadline,
            signature: PermitSignature {
                public_key: Some(f.env.public_key(&alice)),
                signature: f.env.sign_message(&digest, &alice),
            },
        };
        f.env.advance_block_time(61 * 1_000);
        assert_eq!(f.manager.try_permit(valid), Err(VaultError::ExpiredSignature.into()));
        assert_eq!(f.manager.nonce(alice), 0);
    }

    #[test]
    fn test_debt_moves_inside_one_engine() {
        let mut f = setup();
        let alice = f.alice;
        let source = open(&mut f, alice, tokens(10), tokens(4));
        let target = open(&mut f, alice, tokens(10), U256::zero());
        let this = f.manager.address().clone();

        f.env.set_caller(alice);
        let receipt = f.manager.apply(vec![batch::get_debt_in(target, this, source, tokens(4))], alice, alice);
        assert_eq!(receipt.stablecoin_minted, U256::zero());
        assert_eq!(receipt.stablecoin_burned, U256::zero());
        assert_eq!(f.manager.vault_debt(source), U256::zero());
        assert_eq!(f.manager.vault_debt(target), tokens(4));
        assert_eq!(f.manager.total_debt(), tokens(4));
    }

    #[test]
    fn test_debt_moves_between_engines() {
        let mut f = setup();
        let alice = f.alice;
        let mut other = deploy_manager(&mut f, params());
        let first = f.manager.address().clone();
        let second = other.address().clone();

        let source = open(&mut f, alice, tokens(10), tokens(4));
        f.env.set_caller(alice);
        other.apply(
            vec![batch::create_vault(alice), batch::add_collateral(1, tokens(10))],
            alice,
            alice,
        );

        f.env.set_caller(alice);
        assert_eq!(
            other.try_apply(vec![batch::get_debt_in(1, first, source, tokens(3))], alice, alice),
            Err(VaultError::NotPeerManager.into())
        );

        f.env.set_caller(f.admin);
        f.manager.set_peer_manager(second, true);
        other.set_peer_manager(first, true);

        f.env.set_caller(alice);
        other.apply(vec![batch::get_debt_in(1, first, source, tokens(3))], alice, alice);
        assert_eq!(other.vault_debt(1), tokens(3));
        assert_eq!(f.manager.vault_debt(source), tokens(1));
        assert_eq!(f.stablecoin.balance_of(alice), tokens(4));

        // Only registered peers may pull debt out directly
        assert_eq!(
            f.manager.try_get_debt_out(source, tokens(1), 1, U256::zero(), U256::zero()),
            Err(VaultError::NotPeerManager.into())
        );
    }

    #[test]
    fn test_debt_moved_into_pricier_engine_pays_fee_difference() {
        let mut f = setup();
        let alice = f.alice;
        let mut pricey = deploy_manager(&mut f, VaultParameters { borrow_fee: pct(10), ..params() });
        let cheap = f.manager.address().clone();
        f.manager.set_peer_manager(pricey.address().clone(), true);
        pricey.set_peer_manager(cheap, true);

        let source = open(&mut f, alice, tokens(100), tokens(40));
        f.env.set_caller(alice);
        pricey.apply(
            vec![
                batch::create_vault(alice),
                batch::add_collateral(1, tokens(100)),
                batch::get_debt_in(1, cheap, source, tokens(40)),
            ],
            alice,
            alice,
        );

        // Borrowing 40 directly on the pricier engine would owe 44
        assert_eq!(pricey.vault_debt(1), tokens(40));
        assert_eq!(f.manager.vault_debt(source), tokens(4));
        assert_eq!(f.manager.surplus(), tokens(4));
        assert_eq!(f.stablecoin.balance_of(alice), tokens(40));

        // Both engines describe the move the same way
        let moved = DebtTransferred {
            src_vault_id: 1,
            dst_vault_id: source,
            dst_vault_manager: cheap,
            amount: tokens(40),
        };
        assert!(f.env.emitted_event(&pricey, moved.clone()));
        assert!(f.env.emitted_event(&f.manager, moved));
    }

    #[test]
    fn test_check_liquidation_clamps_discount() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));

        assert_eq!(
            f.manager.try_check_liquidation(vault_id, bob),
            Err(VaultError::NotLiquidatable.into())
        );

        // 153 of value at cf 0.5 against 90 of debt: hf 0.85
        set_price(&mut f, U256::from(153) * wad() / 100);
        let opp = f.manager.check_liquidation(vault_id, bob);
        assert_eq!(opp.health_factor, pct(85));
        assert_eq!(opp.discount, pct(90));
        assert_eq!(opp.current_debt, tokens(90));
        assert_eq!(opp.collateral_value, tokens(153));
    }

    #[test]
    fn test_liquidation_restores_target_health() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));
        open(&mut f, bob, tokens(1_000), tokens(200));

        set_price(&mut f, U256::from(17) * wad() / 10);
        let opp = f.manager.check_liquidation(vault_id, bob);
        assert!(opp.max_stablecoin_amount_to_repay < tokens(90));

        f.env.set_caller(bob);
        let receipt = f.manager.liquidate(
            vec![vault_id],
            vec![opp.max_stablecoin_amount_to_repay],
            bob,
            bob,
        );
        assert_eq!(receipt.stablecoin_paid, opp.max_stablecoin_amount_to_repay);
        assert_eq!(receipt.collateral_released, opp.max_collateral_amount_given);
        // Bob's own 1000 units are locked in his vault
        assert_eq!(f.collateral.balance_of(bob), receipt.collateral_released);
        assert_eq!(f.stablecoin.balance_of(bob), tokens(200) - receipt.stablecoin_paid);
        assert_eq!(f.manager.surplus(), receipt.stablecoin_paid - receipt.debt_cleared);

        let hf = f.manager.health_factor(vault_id);
        assert!(hf > pct(109) && hf < pct(111));
        assert_eq!(f.manager.vault(vault_id).unwrap().status, VaultStatus::Active);
    }

    #[test]
    fn test_dust_collateral_forces_full_seizure() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));
        open(&mut f, bob, tokens(1_000), tokens(200));

        f.env.set_caller(f.admin);
        f.manager.set_dusts(U256::zero(), U256::zero(), tokens(150));
        set_price(&mut f, U256::from(17) * wad() / 10);

        let opp = f.manager.check_liquidation(vault_id, bob);
        assert_eq!(opp.max_collateral_amount_given, tokens(100));
        // All debt at the 0.9 surcharge
        assert_eq!(opp.max_stablecoin_amount_to_repay, tokens(100));

        f.env.set_caller(bob);
        let receipt = f.manager.liquidate(vec![vault_id], vec![tokens(100)], bob, bob);
        assert_eq!(receipt.collateral_released, tokens(100));
        assert_eq!(receipt.debt_cleared, tokens(90));

        let vault = f.manager.vault(vault_id).unwrap();
        assert_eq!(vault.status, VaultStatus::Closed);
        assert_eq!(f.manager.bad_debt(), U256::zero());
        assert_eq!(f.manager.vault_debt(2), tokens(200));
        assert_eq!(f.manager.total_debt(), tokens(200));
    }

    #[test]
    fn test_underwater_liquidation_records_bad_debt() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));
        open(&mut f, bob, tokens(1_000), tokens(200));

        // 60 of value against 90 of debt
        set_price(&mut f, pct(60));
        let opp = f.manager.check_liquidation(vault_id, bob);
        assert_eq!(opp.max_stablecoin_amount_to_repay, tokens(54));

        f.env.set_caller(bob);
        f.manager.liquidate(vec![vault_id], vec![tokens(54)], bob, bob);
        assert_eq!(f.manager.vault(vault_id).unwrap().status, VaultStatus::Closed);
        // 54 * 0.9 cleared out of 90
        assert_eq!(f.manager.bad_debt(), milli(41_400));
        assert_eq!(f.manager.surplus(), milli(5_400));

        assert_eq!(f.manager.accrue_interest_to_treasury(), U256::zero());
        assert_eq!(f.manager.bad_debt(), tokens(36));
        assert_eq!(f.manager.surplus(), U256::zero());
    }

    #[test]
    fn test_liquidation_leaving_dust_debt_seizes_everything() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));
        open(&mut f, bob, tokens(1_000), tokens(200));

        f.env.set_caller(f.admin);
        f.manager.set_dusts(tokens(50), tokens(50), U256::zero());
        set_price(&mut f, pct(60));

        // Repaying 50 clears 45 and would leave 45 of debt, under the dust
        f.env.set_caller(bob);
        let receipt = f.manager.liquidate(vec![vault_id], vec![tokens(50)], bob, bob);
        assert_eq!(receipt.stablecoin_paid, tokens(54));
        assert_eq!(receipt.collateral_released, tokens(100));
        assert_eq!(receipt.debt_cleared, milli(48_600));

        assert_eq!(f.manager.vault(vault_id).unwrap().status, VaultStatus::Closed);
        assert_eq!(f.collateral.balance_of(bob), tokens(100));
        // Nothing goes back to the insolvent owner
        assert_eq!(f.collateral.balance_of(alice), tokens(900));
        assert_eq!(f.manager.bad_debt(), milli(41_400));
        assert_eq!(f.manager.surplus(), milli(5_400));
    }

    #[test]
    fn test_liquidation_skips_failing_vaults() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let risky = open(&mut f, alice, tokens(100), tokens(90));
        let safe = open(&mut f, alice, tokens(100), tokens(10));
        open(&mut f, bob, tokens(1_000), tokens(200));

        set_price(&mut f, U256::from(17) * wad() / 10);
        let opp = f.manager.check_liquidation(risky, bob);

        f.env.set_caller(bob);
        let receipt = f.manager.liquidate(
            vec![99, safe, risky, risky],
            vec![tokens(1), tokens(1), tokens(1), opp.max_stablecoin_amount_to_repay * 2],
            bob,
            bob,
        );
        let codes: Vec<u16> = receipt.outcomes.iter().map(|o| o.error_code).collect();
        assert_eq!(
            codes,
            vec![
                VaultError::VaultNotFound as u16,
                VaultError::NotLiquidatable as u16,
                0,
                VaultError::RepayExceedsLiquidationBound as u16,
            ]
        );
        assert!(receipt.outcomes[2].liquidated);
        assert_eq!(receipt.stablecoin_paid, tokens(1));
        assert_eq!(receipt.debt_cleared, pct(90));
        assert_eq!(f.manager.vault_debt(risky), tokens(90) - pct(90));
        assert_eq!(
            f.manager.try_liquidate(vec![risky], vec![], bob, bob),
            Err(VaultError::IncompatibleLengths.into())
        );
    }

    #[test]
    fn test_boosted_liquidator_gets_larger_discount() {
        let mut f = setup();
        let alice = f.alice;
        let bob = f.bob;
        let vault_id = open(&mut f, alice, tokens(100), tokens(90));

        f.env.set_caller(f.admin);
        let mut proxy = MockBoostProxy::deploy(&f.env, NoArgs);
        proxy.set_balance(bob, tokens(500));
        f.manager.set_boost_curve(vec![
            BoostStep { threshold: U256::zero(), boost: wad() },
            BoostStep { threshold: tokens(100), boost: pct(200) },
        ]);
        f.manager.set_boost_provider(Some(proxy.address().clone()));

        // hf 0.97: a 3% discount, doubled for bob
        set_price(&mut f, U256::from(1_746) * wad() / 1_000);
        assert_eq!(f.manager.check_liquidation(vault_id, alice).discount, pct(97));
        assert_eq!(f.manager.check_liquidation(vault_id, bob).discount, pct(94));
    }

    #[test]
    fn test_governance_is_admin_only_and_validated() {
        let mut f = setup();
        let alice = f.alice;

        f.env.set_caller(alice);
        assert_eq!(
            f.manager.try_set_risk_parameter(RiskParameter::DebtCeiling, tokens(1)),
            Err(VaultError::Unauthorized.into())
        );
        assert_eq!(f.manager.try_toggle_pause(), Err(VaultError::Unauthorized.into()));

        f.env.set_caller(f.admin);
        // Collateral factor above the liquidation surcharge
        assert_eq!(
            f.manager.try_set_risk_parameter(RiskParameter::CollateralFactor, pct(95)),
            Err(VaultError::InvalidParameterValue.into())
        );
        assert_eq!(
            f.manager.try_set_risk_parameter(RiskParameter::TargetHealthFactor, pct(99)),
            Err(VaultError::InvalidParameterValue.into())
        );
        assert_eq!(
            f.manager.try_set_risk_parameter(RiskParameter::InterestRate, U256::from(10u64).pow(U256::from(26u64))),
            Err(VaultError::InvalidParameterValue.into())
        );
        assert_eq!(
            f.manager.try_set_boost_curve(vec![
                BoostStep { threshold: tokens(2), boost: wad() },
                BoostStep { threshold: tokens(1), boost: wad() },
            ]),
            Err(VaultError::InvalidParameterValue.into())
        );

        f.manager.set_risk_parameter(RiskParameter::CollateralFactor, pct(60));
        assert_eq!(f.manager.risk_config().collateral_factor, pct(60));
    }
}
