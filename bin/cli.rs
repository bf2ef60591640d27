//! CLI tool for deploying and interacting with the CDP vault contracts.

use cdp_vaults::tokens::{CollateralToken, Stablecoin};
use cdp_vaults::vaults::{Action, PriceOracle, VaultManager, VaultParameters};
use odra::casper_types::U256;
use odra::host::HostEnv;
use odra::prelude::{Addressable, OdraError};
use odra::schema::casper_contract_schema::NamedCLType;
use odra_cli::{
    deploy::DeployScript,
    scenario::{Args, Error, Scenario, ScenarioMetadata},
    CommandArg, ContractProvider, DeployedContractsContainer, DeployerExt,
    OdraCli,
};

/// 10^18
fn wad() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

fn pct(value: u64) -> U256 {
    wad() * U256::from(value) / U256::from(100u64)
}

/// Deploys the stablecoin and the collateral token.
pub struct TokensDeployScript;

impl DeployScript for TokensDeployScript {
    fn deploy(
        &self,
        env: &HostEnv,
        container: &mut DeployedContractsContainer
    ) -> Result<(), odra_cli::deploy::Error> {
        use cdp_vaults::tokens::{CollateralTokenInitArgs, StablecoinInitArgs};

        let _stablecoin = Stablecoin::load_or_deploy(
            &env,
            StablecoinInitArgs {
                name: String::from("Vault USD"),
                symbol: String::from("VUSD"),
            },
            container,
            300_000_000_000
        )?;

        let _collateral = CollateralToken::load_or_deploy(
            &env,
            CollateralTokenInitArgs {
                name: String::from("Wrapped CSPR"),
                symbol: String::from("WCSPR"),
                decimals: 9,
            },
            container,
            300_000_000_000
        )?;

        Ok(())
    }
}

/// Deploys the collateral price oracle.
pub struct OracleDeployScript;

impl DeployScript for OracleDeployScript {
    fn deploy(
        &self,
        env: &HostEnv,
        container: &mut DeployedContractsContainer
    ) -> Result<(), odra_cli::deploy::Error> {
        use cdp_vaults::vaults::price_oracle::PriceOracleInitArgs;

        let _oracle = PriceOracle::load_or_deploy(
            &env,
            PriceOracleInitArgs { max_staleness: 3_600 },
            container,
            200_000_000_000
        )?;

        Ok(())
    }
}

/// Deploys the vault manager and registers it as a stablecoin minter.
/// Requires the tokens and the oracle to be deployed first.
pub struct VaultManagerDeployScript;

impl DeployScript for VaultManagerDeployScript {
    fn deploy(
        &self,
        env: &HostEnv,
        container: &mut DeployedContractsContainer
    ) -> Result<(), odra_cli::deploy::Error> {
        use cdp_vaults::vaults::vault_manager::VaultManagerInitArgs;

        let mut stablecoin = container.contract_ref::<Stablecoin>(env)?;
        let collateral = container.contract_ref::<CollateralToken>(env)?;
        let oracle = container.contract_ref::<PriceOracle>(env)?;

        let manager = VaultManager::load_or_deploy(
            &env,
            VaultManagerInitArgs {
                stablecoin: stablecoin.address().clone(),
                collateral: collateral.address().clone(),
                oracle: oracle.address().clone(),
                treasury: env.caller(),
                params: VaultParameters {
                    debt_ceiling: wad() * U256::from(10_000_000u64),
                    collateral_factor: pct(60),
                    target_health_factor: pct(110),
                    interest_rate: U256::zero(),
                    liquidation_surcharge: pct(98),
                    max_liquidation_discount: pct(10),
                    borrow_fee: U256::zero(),
                    repay_fee: U256::zero(),
                    whitelisting_activated: false,
                },
            },
            container,
            600_000_000_000 // Gas limit for vault manager deployment
        )?;

        env.set_gas(50_000_000_000);
        stablecoin.set_minter(manager.address().clone(), true);

        Ok(())
    }
}

/// Deploys the complete CDP system (tokens + oracle + vault manager).
pub struct CdpDeployScript;

impl DeployScript for CdpDeployScript {
    fn deploy(
        &self,
        env: &HostEnv,
        container: &mut DeployedContractsContainer
    ) -> Result<(), odra_cli::deploy::Error> {
        TokensDeployScript.deploy(env, container)?;
        OracleDeployScript.deploy(env, container)?;
        VaultManagerDeployScript.deploy(env, container)?;
        Ok(())
    }
}

/// Scenario to open a vault, deposit collateral and borrow in one batch.
pub struct OpenVaultScenario;

impl Scenario for OpenVaultScenario {
    fn args(&self) -> Vec<CommandArg> {
        vec![
            CommandArg::new(
                "collateral",
                "Collateral to deposit, in token units",
                NamedCLType::U256,
            ),
            CommandArg::new(
                "debt",
                "Stablecoins to borrow",
                NamedCLType::U256,
            ),
        ]
    }

    fn run(
        &self,
        env: &HostEnv,
        container: &DeployedContractsContainer,
        args: Args
    ) -> Result<(), Error> {
        let mut manager = container.contract_ref::<VaultManager>(env)?;
        let mut collateral = container.contract_ref::<CollateralToken>(env)?;
        let amount = args.get_single::<U256>("collateral")?;
        let debt = args.get_single::<U256>("debt")?;
        let owner = env.caller();

        env.set_gas(50_000_000_000);
        collateral.try_approve(manager.address().clone(), amount)?;

        let vault_id = manager.vault_count() + 1;
        let actions = vec![
            Action::create_vault(owner).map_err(OdraError::from)?,
            Action::add_collateral(vault_id, amount).map_err(OdraError::from)?,
            Action::borrow(vault_id, debt).map_err(OdraError::from)?,
        ];
        env.set_gas(400_000_000_000);
        let receipt = manager.try_apply(actions, owner, owner)?;

        println!("Vault {} opened, {} stablecoins minted", vault_id, receipt.stablecoin_minted);
        Ok(())
    }
}

impl ScenarioMetadata for OpenVaultScenario {
    const NAME: &'static str = "open-vault";
    const DESCRIPTION: &'static str = "Opens a vault, deposits collateral and borrows against it";
}

/// Scenario to liquidate one vault up to its current bound.
pub struct LiquidateScenario;

impl Scenario for LiquidateScenario {
    fn args(&self) -> Vec<CommandArg> {
        vec![CommandArg::new(
            "vault_id",
            "Vault to liquidate",
            NamedCLType::U64,
        )]
    }

    fn run(
        &self,
        env: &HostEnv,
        container: &DeployedContractsContainer,
        args: Args
    ) -> Result<(), Error> {
        let mut manager = container.contract_ref::<VaultManager>(env)?;
        let vault_id = args.get_single::<u64>("vault_id")?;
        let liquidator = env.caller();

        let opportunity = manager.try_check_liquidation(vault_id, liquidator)?;
        env.set_gas(400_000_000_000);
        let receipt = manager.try_liquidate(
            vec![vault_id],
            vec![opportunity.max_stablecoin_amount_to_repay],
            liquidator,
            liquidator,
        )?;

        println!(
            "Paid {} stablecoins for {} collateral",
            receipt.stablecoin_paid, receipt.collateral_released
        );
        Ok(())
    }
}

impl ScenarioMetadata for LiquidateScenario {
    const NAME: &'static str = "liquidate";
    const DESCRIPTION: &'static str = "Liquidates a vault for the largest amount it allows";
}

/// Main function to run the CLI tool.
pub fn main() {
    OdraCli::new()
        .about("CLI tool for the CDP vault contracts")
        // Deploy scripts
        .deploy(TokensDeployScript)
        .deploy(OracleDeployScript)
        .deploy(VaultManagerDeployScript)
        .deploy(CdpDeployScript)
        // Contract references
        .contract::<Stablecoin>()
        .contract::<CollateralToken>()
        .contract::<PriceOracle>()
        .contract::<VaultManager>()
        // Scenarios
        .scenario(OpenVaultScenario)
        .scenario(LiquidateScenario)
        .build()
        .run();
}
