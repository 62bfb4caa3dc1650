//! Reserve, leading rate, savings and minter entry points.

use tracing::info;

use crate::core::leadrate::RateProposal;
use crate::error::Result;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::state_machine::ProtocolState;
use crate::utils::address::Address;
use crate::utils::math::validate_ppm;

impl ProtocolState {
    // ═══════════════════════════════════════════════════════════════════════════
    // RESERVE SHARES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Invest in the reserve; returns the shares received
    pub fn invest(&mut self, investor: Address, amount: u128, min_shares: u128) -> Result<u128> {
        let now = self.timestamp;
        let investment = self
            .reserve
            .invest(investor, amount, min_shares, &mut self.stablecoin, now)?;
        info!(investor = %investor.short(), amount, shares = investment.shares, "Invested in reserve");
        Ok(investment.shares)
    }

    /// Redeem reserve shares to the holder; returns the proceeds
    pub fn redeem(&mut self, holder: Address, shares: u128, min_proceeds: u128) -> Result<u128> {
        let now = self.timestamp;
        let proceeds = self
            .reserve
            .redeem(holder, holder, shares, min_proceeds, &mut self.stablecoin, now)?;
        info!(holder = %holder.short(), shares, proceeds, "Redeemed reserve shares");
        Ok(proceeds)
    }

    /// Delegate the holder's votes
    pub fn delegate(&mut self, holder: Address, delegate: Address) -> Result<()> {
        self.reserve.delegate_vote_to(holder, delegate);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LEADING RATE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Propose a new leading rate; requires a qualified proposer
    pub fn propose_rate(
        &mut self,
        proposer: Address,
        rate_ppm: u32,
        helpers: &[Address],
    ) -> Result<RateProposal> {
        let now = self.timestamp;
        validate_ppm("rate_ppm", rate_ppm)?;
        self.reserve.check_qualified(&proposer, helpers, now)?;
        let proposal = self
            .leadrate
            .propose_change(rate_ppm, self.params.rate_change_delay, now);
        self.emit(ProtocolEvent::RateProposed {
            proposer,
            rate_ppm,
            ready_at: proposal.ready_at,
        });
        Ok(proposal)
    }

    /// Apply the pending rate once its delay has passed
    pub fn apply_rate_change(&mut self) -> Result<u32> {
        let rate_ppm = self.leadrate.apply_change(self.timestamp)?;
        self.emit(ProtocolEvent::RateChanged { rate_ppm });
        info!(rate_ppm, "Leading rate changed");
        Ok(rate_ppm)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SAVINGS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit into savings; returns the saved balance
    pub fn save(&mut self, owner: Address, amount: u128) -> Result<u128> {
        let now = self.timestamp;
        self.refresh_savings(owner)?;
        let saved = self
            .savings
            .save(owner, amount, &mut self.stablecoin, &self.leadrate, now)?;
        self.emit(ProtocolEvent::Saved {
            account: owner,
            amount,
        });
        Ok(saved)
    }

    /// Withdraw up to `amount` of savings to `target`
    pub fn withdraw_savings(&mut self, owner: Address, target: Address, amount: u128) -> Result<u128> {
        let now = self.timestamp;
        self.refresh_savings(owner)?;
        let withdrawn = self.savings.withdraw(
            owner,
            target,
            amount,
            &mut self.stablecoin,
            &self.leadrate,
            now,
        )?;
        self.emit(ProtocolEvent::SavingsWithdrawn {
            account: owner,
            amount: withdrawn,
        });
        Ok(withdrawn)
    }

    /// Settle accrued savings interest into the account
    pub fn refresh_savings(&mut self, owner: Address) -> Result<u128> {
        let now = self.timestamp;
        let interest = self
            .savings
            .refresh(owner, &mut self.stablecoin, &self.leadrate, now)?;
        if interest > 0 {
            self.emit(ProtocolEvent::InterestCollected {
                account: owner,
                interest,
            });
        }
        Ok(interest)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MINTERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply for minting rights; `payer` pays the fee into the reserve
    pub fn suggest_minter(
        &mut self,
        applicant: Address,
        payer: Address,
        period: u64,
        fee: u128,
        message: &str,
    ) -> Result<()> {
        let now = self.timestamp;
        self.stablecoin.suggest_minter(
            applicant,
            payer,
            period,
            fee,
            self.params.min_application_period,
            self.params.min_application_fee,
            message,
            now,
        )?;
        self.emit(ProtocolEvent::Profit {
            source: payer,
            amount: fee,
        });
        self.emit(ProtocolEvent::MinterApplied {
            minter: applicant,
            period,
            fee,
            message: message.to_string(),
        });
        info!(minter = %applicant.short(), period, "Minter application filed");
        Ok(())
    }

    /// Veto a minter application that is not effective yet
    pub fn deny_minter(
        &mut self,
        caller: Address,
        minter: Address,
        helpers: &[Address],
        message: &str,
    ) -> Result<()> {
        let now = self.timestamp;
        self.reserve.check_qualified(&caller, helpers, now)?;
        self.stablecoin.deny_minter(&minter, now)?;
        self.emit(ProtocolEvent::MinterDenied {
            minter,
            message: message.to_string(),
        });
        info!(minter = %minter.short(), "Minter application denied");
        Ok(())
    }
}
