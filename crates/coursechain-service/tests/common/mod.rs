//! In-process course market node for integration tests.
//!
//! `FakeChain` answers the `eth_*` methods the service uses and executes the
//! market rules over the real ABI encoding. Every accepted transaction is
//! mined into its own block immediately. `TestSigner` "signs" by JSON-encoding
//! the transaction, which `FakeChain` decodes on `eth_sendRawTransaction`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{keccak256, Address, Bytes, LogData, B256, U256};
use alloy_sol_types::{SolEvent, SolInterface, SolValue};
use async_trait::async_trait;
use coursechain_core::contract::{CourseCreated, CoursePurchased, ICourseMarketCalls};
use coursechain_core::revert::ERROR_STRING_SELECTOR;
use coursechain_core::CourseError;
use coursechain_rpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, RawLog, RpcTransport, TransportError,
};
use coursechain_service::{CourseService, ServiceConfig, TransactionSigner, UnsignedTx};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CHAIN_ID: u64 = 31337;
pub const GAS_PRICE: u128 = 1_000_000_000;
pub const GAS_ESTIMATE: u64 = 150_000;
pub const GENESIS_TIME: u64 = 1_700_000_000;

pub fn market() -> Address {
    "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap()
}

pub fn author() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn buyer() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

/// Signed payload understood by [`FakeChain`].
#[derive(Debug, Serialize, Deserialize)]
struct TestTx {
    from: Address,
    chain_id: u64,
    nonce: u64,
    to: Address,
    value: U256,
    gas_limit: u64,
    input: Bytes,
}

pub struct TestSigner(pub Address);

impl TransactionSigner for TestSigner {
    fn address(&self) -> Address {
        self.0
    }

    fn sign(&self, tx: UnsignedTx) -> Result<Bytes, CourseError> {
        let payload = TestTx {
            from: self.0,
            chain_id: tx.chain_id,
            nonce: tx.nonce,
            to: tx.to,
            value: tx.value,
            gas_limit: tx.gas_limit,
            input: tx.input,
        };
        serde_json::to_vec(&payload)
            .map(Bytes::from)
            .map_err(|e| CourseError::Signing(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Course {
    title: String,
    description: String,
    author: Address,
    price: U256,
    created_at: u64,
    buyers: Vec<Address>,
}

#[derive(Debug, Clone, Default)]
struct State {
    block: u64,
    courses: Vec<Course>,
    purchases: HashMap<Address, Vec<u64>>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<B256, Value>,
    logs: Vec<RawLog>,
    /// Ids whose `getCourse` reverts even though they are counted.
    hidden: HashSet<u64>,
}

type Revert = String;

impl State {
    fn course(&self, id: U256) -> Result<(u64, &Course), Revert> {
        let id = u64::try_from(id).map_err(|_| "Course does not exist".to_string())?;
        match id.checked_sub(1).and_then(|i| self.courses.get(i as usize)) {
            Some(c) if !self.hidden.contains(&id) => Ok((id, c)),
            _ => Err("Course does not exist".into()),
        }
    }

    /// Run a call. Returns ABI return data and emitted logs, or a revert reason.
    fn execute(
        &mut self,
        from: Address,
        value: U256,
        input: &[u8],
    ) -> Result<(Vec<u8>, Vec<LogData>), Revert> {
        let call = ICourseMarketCalls::abi_decode(input, true)
            .map_err(|_| "unknown selector".to_string())?;
        match call {
            ICourseMarketCalls::createCourse(c) => {
                if c._title.is_empty() {
                    return Err("Title cannot be empty".into());
                }
                let id = self.courses.len() as u64 + 1;
                self.courses.push(Course {
                    title: c._title.clone(),
                    description: c._description,
                    author: from,
                    price: c._price,
                    created_at: GENESIS_TIME + self.block + 1,
                    buyers: vec![],
                });
                let log = CourseCreated {
                    courseId: U256::from(id),
                    title: c._title,
                    author: from,
                    price: c._price,
                }
                .encode_log_data();
                Ok((U256::from(id).abi_encode(), vec![log]))
            }
            ICourseMarketCalls::purchaseCourse(c) => {
                let (id, course) = self.course(c._courseId)?;
                let (price, course_author) = (course.price, course.author);
                if value < price {
                    return Err("Insufficient payment".into());
                }
                if from == course_author {
                    return Err("Author cannot purchase own course".into());
                }
                if course.buyers.contains(&from) {
                    return Err("Course already purchased".into());
                }
                self.courses[(id - 1) as usize].buyers.push(from);
                self.purchases.entry(from).or_default().push(id);
                let payer = self.balances.entry(from).or_default();
                *payer = payer.saturating_sub(value);
                *self.balances.entry(course_author).or_default() += value;
                let log = CoursePurchased {
                    courseId: c._courseId,
                    buyer: from,
                    price: value,
                }
                .encode_log_data();
                Ok((Vec::new(), vec![log]))
            }
            ICourseMarketCalls::getCourse(c) => {
                let (_, course) = self.course(c._courseId)?;
                let ret = (
                    course.title.clone(),
                    course.description.clone(),
                    course.author,
                    course.price,
                    U256::from(course.created_at),
                );
                Ok((ret.abi_encode_params(), vec![]))
            }
            ICourseMarketCalls::getCourseBuyers(c) => {
                let (_, course) = self.course(c._courseId)?;
                Ok((course.buyers.abi_encode(), vec![]))
            }
            ICourseMarketCalls::getUserPurchasedCourses(c) => {
                let ids: Vec<U256> = self
                    .purchases
                    .get(&c._user)
                    .map(|ids| ids.iter().map(|&i| U256::from(i)).collect())
                    .unwrap_or_default();
                Ok((ids.abi_encode(), vec![]))
            }
            ICourseMarketCalls::hasUserPurchasedCourse(c) => {
                let (_, course) = self.course(c._courseId)?;
                Ok((course.buyers.contains(&c._user).abi_encode(), vec![]))
            }
            ICourseMarketCalls::getCourseCount(_) | ICourseMarketCalls::courseCounter(_) => {
                Ok((U256::from(self.courses.len()).abi_encode(), vec![]))
            }
        }
    }
}

fn revert_error(reason: &str) -> JsonRpcError {
    let mut data = ERROR_STRING_SELECTOR.to_vec();
    data.extend(reason.to_string().abi_encode());
    JsonRpcError {
        code: 3,
        message: format!("execution reverted: {reason}"),
        data: Some(json!(Bytes::from(data))),
    }
}

fn node_error(message: &str) -> JsonRpcError {
    JsonRpcError {
        code: -32000,
        message: message.into(),
        data: None,
    }
}

fn quantity(n: u64) -> Value {
    json!(format!("{n:#x}"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallObject {
    from: Option<Address>,
    to: Address,
    value: Option<U256>,
    data: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterObject {
    address: Option<Address>,
    #[serde(default)]
    topics: Vec<Vec<B256>>,
    from_block: Option<String>,
    to_block: Option<String>,
}

fn parse_block(s: &Option<String>, default: u64) -> u64 {
    s.as_deref()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .unwrap_or(default)
}

#[derive(Default)]
pub struct FakeChain {
    state: Mutex<State>,
    offline: AtomicBool,
    /// Skip the pre-flight revert check in `eth_estimateGas`, so reverting
    /// transactions get mined with status 0.
    blind_estimates: AtomicBool,
    methods: Mutex<Vec<String>>,
    /// Node errors returned for a method instead of executing it.
    faults: Mutex<HashMap<String, JsonRpcError>>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        let chain = Self::default();
        {
            let mut st = chain.lock();
            st.balances.insert(author(), ether(100));
            st.balances.insert(buyer(), ether(100));
        }
        Arc::new(chain)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_blind_estimates(&self, blind: bool) {
        self.blind_estimates.store(blind, Ordering::SeqCst);
    }

    /// Answer every `method` call with a node error until cleared.
    pub fn fail_method(&self, method: &str, code: i64, message: &str) {
        self.faults.lock().unwrap().insert(
            method.to_string(),
            JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn hide_course(&self, id: u64) {
        self.lock().hidden.insert(id);
    }

    pub fn block_number(&self) -> u64 {
        self.lock().block
    }

    /// Count of calls to `method` so far.
    pub fn calls_to(&self, method: &str) -> usize {
        self.methods.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    /// Insert a course directly, bypassing transactions.
    pub fn seed_course(&self, title: &str, price: U256) -> u64 {
        let mut st = self.lock();
        st.courses.push(Course {
            title: title.into(),
            description: format!("{title} description"),
            author: author(),
            price,
            created_at: GENESIS_TIME,
            buyers: vec![],
        });
        st.courses.len() as u64
    }

    fn dispatch(&self, method: &str, params: &[Value]) -> Result<Value, JsonRpcError> {
        let mut st = self.lock();
        match method {
            "eth_chainId" => Ok(quantity(CHAIN_ID)),
            "eth_blockNumber" => Ok(quantity(st.block)),
            "eth_gasPrice" => Ok(json!(format!("{GAS_PRICE:#x}"))),
            "eth_getTransactionCount" => {
                let addr: Address = param(params, 0)?;
                Ok(quantity(st.nonces.get(&addr).copied().unwrap_or(0)))
            }
            "eth_getBalance" => {
                let addr: Address = param(params, 0)?;
                Ok(json!(st.balances.get(&addr).copied().unwrap_or_default()))
            }
            "eth_call" => {
                let call: CallObject = param(params, 0)?;
                if call.to != market() {
                    return Ok(json!("0x"));
                }
                let mut scratch = st.clone();
                let from = call.from.unwrap_or_default();
                match scratch.execute(from, call.value.unwrap_or_default(), &call.data) {
                    Ok((ret, _)) => Ok(json!(Bytes::from(ret))),
                    Err(reason) => Err(revert_error(&reason)),
                }
            }
            "eth_estimateGas" => {
                let call: CallObject = param(params, 0)?;
                if self.blind_estimates.load(Ordering::SeqCst) {
                    return Ok(quantity(GAS_ESTIMATE));
                }
                let mut scratch = st.clone();
                let from = call.from.unwrap_or_default();
                match scratch.execute(from, call.value.unwrap_or_default(), &call.data) {
                    Ok(_) => Ok(quantity(GAS_ESTIMATE)),
                    Err(reason) => Err(revert_error(&reason)),
                }
            }
            "eth_sendRawTransaction" => {
                let raw: Bytes = param(params, 0)?;
                let tx: TestTx = serde_json::from_slice(&raw)
                    .map_err(|_| node_error("rlp: invalid transaction"))?;
                if tx.chain_id != CHAIN_ID {
                    return Err(node_error("invalid chain id for signer"));
                }
                let hash = keccak256(&raw);
                if st.receipts.contains_key(&hash) {
                    return Err(node_error("already known"));
                }
                let expected = st.nonces.get(&tx.from).copied().unwrap_or(0);
                if tx.nonce != expected {
                    return Err(node_error(&format!(
                        "nonce too low: next nonce {expected}, tx nonce {}",
                        tx.nonce
                    )));
                }
                st.nonces.insert(tx.from, expected + 1);
                st.block += 1;
                let block = st.block;
                let block_hash = keccak256(block.to_be_bytes());

                let mut scratch = st.clone();
                let (status, logs) = match scratch.execute(tx.from, tx.value, &tx.input) {
                    Ok((_, logs)) => {
                        *st = scratch;
                        (1u64, logs)
                    }
                    Err(_) => (0u64, vec![]),
                };

                let raw_logs: Vec<RawLog> = logs
                    .into_iter()
                    .enumerate()
                    .map(|(i, data)| RawLog {
                        address: market(),
                        topics: data.topics().to_vec(),
                        data: data.data,
                        block_number: Some(format!("{block:#x}")),
                        transaction_hash: Some(hash),
                        log_index: Some(format!("{i:#x}")),
                        removed: false,
                    })
                    .collect();
                st.logs.extend(raw_logs.iter().cloned());
                st.receipts.insert(
                    hash,
                    json!({
                        "transactionHash": hash,
                        "blockHash": block_hash,
                        "blockNumber": format!("{block:#x}"),
                        "status": format!("{status:#x}"),
                        "gasUsed": format!("{:#x}", GAS_ESTIMATE / 2),
                        "effectiveGasPrice": format!("{GAS_PRICE:#x}"),
                        "logs": raw_logs,
                    }),
                );
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                let hash: B256 = param(params, 0)?;
                Ok(st.receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            "eth_getLogs" => {
                let filter: FilterObject = param(params, 0)?;
                let from = parse_block(&filter.from_block, 0);
                let to = parse_block(&filter.to_block, st.block);
                let topic0: Vec<B256> = filter.topics.into_iter().next().unwrap_or_default();
                let logs: Vec<&RawLog> = st
                    .logs
                    .iter()
                    .filter(|l| filter.address.map_or(true, |a| a == l.address))
                    .filter(|l| (from..=to).contains(&l.block_number_u64()))
                    .filter(|l| {
                        topic0.is_empty() || l.topics.first().is_some_and(|t| topic0.contains(t))
                    })
                    .collect();
                Ok(json!(logs))
            }
            other => Err(JsonRpcError {
                code: -32601,
                message: format!("method {other} not found"),
                data: None,
            }),
        }
    }
}

fn param<T: serde::de::DeserializeOwned>(params: &[Value], i: usize) -> Result<T, JsonRpcError> {
    params
        .get(i)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| JsonRpcError {
            code: -32602,
            message: format!("invalid params at {i}"),
            data: None,
        })
}

#[async_trait]
impl RpcTransport for FakeChain {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Http("connection refused".into()));
        }
        self.methods.lock().unwrap().push(req.method.clone());
        if let Some(fault) = self.faults.lock().unwrap().get(&req.method).cloned() {
            return Ok(JsonRpcResponse::failure(req.id, fault));
        }
        Ok(match self.dispatch(&req.method, &req.params) {
            Ok(result) => JsonRpcResponse::success(req.id, result),
            Err(error) => JsonRpcResponse::failure(req.id, error),
        })
    }

    fn url(&self) -> &str {
        "fake://course-market"
    }
}

pub fn test_config() -> ServiceConfig {
    let mut cfg = ServiceConfig::new("http://localhost:8545", market());
    cfg.receipt_poll_ms = 5;
    cfg.log_poll_ms = 10;
    cfg
}

/// Service acting as `account` against `chain`.
pub fn service_for(chain: &Arc<FakeChain>, account: Address) -> CourseService {
    CourseService::with_transport(
        test_config(),
        Arc::clone(chain) as Arc<dyn RpcTransport>,
        Some(Arc::new(TestSigner(account))),
    )
}

/// Read-only service.
pub fn reader_for(chain: &Arc<FakeChain>) -> CourseService {
    CourseService::with_transport(test_config(), Arc::clone(chain) as Arc<dyn RpcTransport>, None)
}
