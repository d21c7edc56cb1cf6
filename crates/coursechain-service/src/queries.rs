//! Read-only contract queries.
//!
//! Plain `eth_call`s with no credential and no local locking; any number may
//! be in flight at once.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use coursechain_core::contract::{
    getCourseBuyersCall, getCourseCall, getCourseCountCall, getUserPurchasedCoursesCall,
    hasUserPurchasedCourseCall,
};
use coursechain_core::{Balance, CourseError, CourseRecord, PriceAmount};
use coursechain_rpc::{BlockTag, CallRequest, EthClient};

#[derive(Clone)]
pub struct CourseReader {
    eth: EthClient,
    contract: Address,
}

impl CourseReader {
    pub fn new(eth: EthClient, contract: Address) -> Self {
        Self { eth, contract }
    }

    async fn call<C: SolCall>(&self, call: C) -> Result<C::Return, CourseError> {
        let request = CallRequest::new(self.contract, call.abi_encode());
        let data = self.eth.call(&request, BlockTag::Latest).await?;
        Ok(C::abi_decode_returns(&data, true)?)
    }

    /// A course by id. Missing ids revert or come back with the zero author.
    pub async fn course(&self, id: u64) -> Result<CourseRecord, CourseError> {
        if id == 0 {
            return Err(CourseError::NotFound { id });
        }
        let ret = self
            .call(getCourseCall {
                _courseId: U256::from(id),
            })
            .await
            .map_err(|e| not_found_on_revert(e, id))?;
        if ret.author == Address::ZERO {
            return Err(CourseError::NotFound { id });
        }
        let created_at = u64::try_from(ret.createdAt).map_err(|_| {
            CourseError::MalformedResponse(format!("createdAt out of range: {}", ret.createdAt))
        })?;
        Ok(CourseRecord::new(
            id,
            ret.title,
            ret.description,
            ret.author,
            ret.price,
            created_at,
        ))
    }

    pub async fn course_buyers(&self, id: u64) -> Result<Vec<Address>, CourseError> {
        let ret = self
            .call(getCourseBuyersCall {
                _courseId: U256::from(id),
            })
            .await
            .map_err(|e| not_found_on_revert(e, id))?;
        Ok(ret._0)
    }

    pub async fn purchased_courses(&self, account: Address) -> Result<Vec<u64>, CourseError> {
        let ret = self
            .call(getUserPurchasedCoursesCall { _user: account })
            .await?;
        ret._0
            .into_iter()
            .map(|id| {
                u64::try_from(id).map_err(|_| {
                    CourseError::MalformedResponse(format!("course id out of range: {id}"))
                })
            })
            .collect()
    }

    pub async fn has_purchased(&self, id: u64, account: Address) -> Result<bool, CourseError> {
        let ret = self
            .call(hasUserPurchasedCourseCall {
                _courseId: U256::from(id),
                _user: account,
            })
            .await
            .map_err(|e| not_found_on_revert(e, id))?;
        Ok(ret._0)
    }

    pub async fn course_count(&self) -> Result<u64, CourseError> {
        let ret = self.call(getCourseCountCall {}).await?;
        u64::try_from(ret._0).map_err(|_| {
            CourseError::MalformedResponse(format!("course count out of range: {}", ret._0))
        })
    }

    pub async fn balance(&self, account: Address) -> Result<Balance, CourseError> {
        let wei = self.eth.balance(account).await?;
        Ok(Balance {
            account,
            amount: PriceAmount::from_smallest_unit(wei),
        })
    }
}

fn not_found_on_revert(err: CourseError, id: u64) -> CourseError {
    match err {
        CourseError::Reverted { reason } => {
            tracing::debug!(id, reason = ?reason, "lookup reverted");
            CourseError::NotFound { id }
        }
        other => other,
    }
}
