//! Shared setup for engine unit tests.

use crate::core::config::ProtocolParams;
use crate::error::Result;
use crate::position::kind::MintReceipt;
use crate::position::position::PositionId;
use crate::protocol::operations::PositionParams;
use crate::protocol::state_machine::Protocol;
use crate::utils::address::Address;
use crate::utils::constants::{MIN_INIT_PERIOD, ONE};

/// Standard terms: 1 WETH minimum, 10 WETH initial, 1M limit, 2,000 per WETH
pub(crate) fn position_params(weth: Address) -> PositionParams {
    PositionParams::new(weth, ONE, 10 * ONE, 1_000_000 * ONE, 2_000 * ONE)
}

/// A protocol at 5% leading rate with one position owned by alice
pub(crate) struct Fixture {
    pub protocol: Protocol,
    pub alice: Address,
    pub bob: Address,
    pub weth: Address,
    pub position: PositionId,
    pub alice_start: u128,
}

impl Fixture {
    /// Position still in its initialization period
    pub fn opened() -> Self {
        let mut protocol = Protocol::new(ProtocolParams::default(), 50_000).unwrap();
        protocol.begin_block(1, 1_000_000).unwrap();
        let alice = Address::user("alice");
        let bob = Address::user("bob");

        protocol.faucet(alice, 10_000 * ONE).unwrap();
        protocol.faucet(bob, 100_000 * ONE).unwrap();
        let weth = protocol.create_token("WETH").unwrap();
        protocol.mint_collateral(weth, alice, 100 * ONE).unwrap();
        protocol.mint_collateral(weth, bob, 100 * ONE).unwrap();

        let position = protocol
            .open_position(alice, position_params(weth))
            .unwrap();
        let alice_start = protocol.balance_of(&alice);
        Self {
            protocol,
            alice,
            bob,
            weth,
            position,
            alice_start,
        }
    }

    /// Position right at the end of its initialization period
    pub fn active() -> Self {
        let mut fixture = Self::opened();
        fixture.protocol.advance_time(MIN_INIT_PERIOD);
        fixture
    }

    /// Alice mints to herself
    pub fn mint(&mut self, amount: u128) -> Result<MintReceipt> {
        self.protocol
            .mint(self.alice, self.position, self.alice, amount)
    }

    /// A challenger funded with WETH and stablecoin
    pub fn carol(&mut self) -> Address {
        let carol = Address::user("carol");
        self.protocol.mint_collateral(self.weth, carol, 50 * ONE).unwrap();
        self.protocol.faucet(carol, 10_000 * ONE).unwrap();
        carol
    }

    /// Fund `who` and invest in the reserve
    pub fn invest(&mut self, who: Address, amount: u128) -> u128 {
        self.protocol.faucet(who, amount).unwrap();
        self.protocol.invest(who, amount, 0).unwrap()
    }

    /// WETH balance
    pub fn weth_of(&self, who: Address) -> u128 {
        self.protocol.token_balance(&self.weth, &who).unwrap()
    }
}
