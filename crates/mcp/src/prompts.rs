// MCP prompts: research plans that point an agent at the right tools

use crate::protocol::{GetPromptResult, PromptArgument, PromptMessage, PromptSchema, Role, ToolContent};
use crate::tools::parse_arguments;
use anyhow::Result;
use harvest_core::error::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Research plan returned as the assistant message of every prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPlan {
    pub goal: &'static str,
    pub steps: Vec<&'static str>,
    pub arguments: Value,
    pub recommended_tools: Vec<&'static str>,
    pub output_format: &'static str,
}

type PlanBuilder = fn(Value) -> Result<PromptPlan, ToolError>;

struct PromptEntry {
    schema: PromptSchema,
    build: PlanBuilder,
}

/// Registry of the built-in prompts
pub struct PromptRegistry {
    prompts: Vec<PromptEntry>,
}

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        description: description.to_string(),
        required,
    }
}

fn schema(name: &str, title: &str, description: &str, arguments: Vec<PromptArgument>) -> PromptSchema {
    PromptSchema {
        name: name.to_string(),
        title: Some(title.to_string()),
        description: description.to_string(),
        arguments,
    }
}

impl PromptRegistry {
    pub fn new() -> Self {
        let prompts = vec![
            PromptEntry {
                schema: schema(
                    "compare-yields",
                    "Compare yield opportunities",
                    "Guides an LLM through comparing multiple yields by orchestrating detail lookups and summarising deltas.",
                    vec![
                        argument("yieldIds", "Comma-separated yield identifiers", true),
                        argument("criteria", "What matters most in the comparison", false),
                    ],
                ),
                build: compare_yields,
            },
            PromptEntry {
                schema: schema(
                    "find-optimal-yield",
                    "Find optimal yield",
                    "Evaluates available yields for a target network or token and risk appetite.",
                    vec![
                        argument("networkId", "Target network", false),
                        argument("tokenSymbol", "Target token symbol", false),
                        argument("minTvlUsd", "Minimum TVL in USD", false),
                        argument("riskTolerance", "conservative, balanced or aggressive", false),
                    ],
                ),
                build: find_optimal_yield,
            },
            PromptEntry {
                schema: schema(
                    "network-due-diligence",
                    "Network due diligence",
                    "Outlines the key facts about a network before recommending strategies.",
                    vec![argument("networkId", "Network identifier", true)],
                ),
                build: network_due_diligence,
            },
            PromptEntry {
                schema: schema(
                    "protocol-risk-review",
                    "Protocol risk review",
                    "Guides analysis of a protocol's health, audits, and APY distribution.",
                    vec![argument("protocolId", "Protocol identifier", true)],
                ),
                build: protocol_risk_review,
            },
            PromptEntry {
                schema: schema(
                    "token-yield-availability",
                    "Token yield availability",
                    "Helps determine where a token can be deployed for yield and how attractive each option is.",
                    vec![argument("tokenSymbol", "Token symbol", true)],
                ),
                build: token_yield_availability,
            },
        ];
        Self { prompts }
    }

    pub fn list(&self) -> Vec<PromptSchema> {
        self.prompts.iter().map(|p| p.schema.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prompts.iter().any(|p| p.schema.name == name)
    }

    /// Build the plan for `name` as a single assistant message.
    pub fn get(&self, name: &str, arguments: Map<String, Value>) -> Result<GetPromptResult> {
        let entry = self
            .prompts
            .iter()
            .find(|p| p.schema.name == name)
            .ok_or_else(|| ToolError::not_found(format!("Prompt {} not found.", name)))?;

        let plan = (entry.build)(Value::Object(arguments))?;
        let text = serde_json::to_string_pretty(&plan)?;

        Ok(GetPromptResult {
            description: Some(entry.schema.description.clone()),
            messages: vec![PromptMessage {
                role: Role::Assistant,
                content: ToolContent::text(text),
            }],
        })
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YieldIds {
    List(Vec<String>),
    Joined(String),
}

impl YieldIds {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(ids) => ids,
            Self::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareArgs {
    yield_ids: YieldIds,
    criteria: Option<String>,
}

fn compare_yields(arguments: Value) -> Result<PromptPlan, ToolError> {
    let args: CompareArgs = parse_arguments(arguments, "compare-yields")?;
    let yield_ids = args.yield_ids.into_vec();
    if yield_ids.is_empty() {
        return Err(ToolError::validation("yieldIds must name at least one yield"));
    }

    Ok(PromptPlan {
        goal: "Compare selected yields across APY, TVL, risk and liquidity dimensions.",
        steps: vec![
            "Call get-yield-details for each yieldId to gather core metrics.",
            "Optionally read yield://{yieldId} resources for percentile and lifecycle insights.",
            "Tabulate APY, TVL, reward tokens, exit conditions, and highlight risk warnings.",
            "Summarise differences and recommend the most appropriate option based on provided criteria.",
        ],
        arguments: serde_json::json!({ "yieldIds": yield_ids, "criteria": args.criteria }),
        recommended_tools: vec!["get-yield-details", "yield://{yieldId}"],
        output_format: "Markdown table summarising metrics followed by recommendation paragraph.",
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RiskTolerance {
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimalArgs {
    network_id: Option<String>,
    token_symbol: Option<String>,
    min_tvl_usd: Option<String>,
    risk_tolerance: Option<RiskTolerance>,
}

fn find_optimal_yield(arguments: Value) -> Result<PromptPlan, ToolError> {
    let args: OptimalArgs = parse_arguments(arguments, "find-optimal-yield")?;
    let min_tvl_usd = match args.min_tvl_usd.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
            ToolError::validation(format!("minTvlUsd must be a number, got {}", raw))
        })?),
    };

    Ok(PromptPlan {
        goal: "Surface the highest quality yield opportunities for the requested parameters.",
        steps: vec![
            "Use get-yields-by-network and/or get-yields-by-token based on provided identifiers.",
            "Filter results by minimum TVL and align risk level with stated tolerance.",
            "Sort by APY and call get-yield-details for finalists to confirm lifecycle constraints.",
            "Summarise top 3 opportunities with rationale and caveats.",
        ],
        arguments: serde_json::json!({
            "networkId": args.network_id,
            "tokenSymbol": args.token_symbol,
            "minTvlUsd": min_tvl_usd,
            "riskTolerance": args.risk_tolerance,
        }),
        recommended_tools: vec![
            "get-yields-by-network",
            "get-yields-by-token",
            "get-top-yields",
            "yield://{yieldId}",
        ],
        output_format: "Bullet list describing each recommended yield with supporting metrics.",
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkArgs {
    network_id: String,
}

fn network_due_diligence(arguments: Value) -> Result<PromptPlan, ToolError> {
    let args: NetworkArgs = parse_arguments(arguments, "network-due-diligence")?;

    Ok(PromptPlan {
        goal: "Produce a due diligence briefing on the specified network.",
        steps: vec![
            "Call get-chain-details to capture governance, finality, and native token info.",
            "Read network://{networkId} to obtain markdown overview and top yields.",
            "Review list-supported-tokens filtered by network to highlight liquid assets.",
            "Summarise validator considerations, notable protocols, and risk factors.",
        ],
        arguments: serde_json::to_value(&args).map_err(|e| ToolError::internal(e.to_string()))?,
        recommended_tools: vec!["get-chain-details", "list-supported-tokens", "network://{networkId}"],
        output_format: "Narrative summary with sections for fundamentals, yields, and cautionary notes.",
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolArgs {
    protocol_id: String,
}

fn protocol_risk_review(arguments: Value) -> Result<PromptPlan, ToolError> {
    let args: ProtocolArgs = parse_arguments(arguments, "protocol-risk-review")?;

    Ok(PromptPlan {
        goal: "Assess protocol resilience and highlight any red flags.",
        steps: vec![
            "Invoke get-protocol-details to retrieve metadata and yield stats.",
            "Read protocol://{protocolId} for aggregated APY insights and risk considerations.",
            "Cross-reference yields with get-lending-yields or get-vault-yields if relevant.",
            "Summarise strengths, weaknesses, and actionable recommendations.",
        ],
        arguments: serde_json::to_value(&args).map_err(|e| ToolError::internal(e.to_string()))?,
        recommended_tools: vec!["get-protocol-details", "protocol://{protocolId}", "get-top-yields"],
        output_format: "Risk report with sections for overview, metrics, audits, and recommendations.",
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenArgs {
    token_symbol: String,
}

fn token_yield_availability(arguments: Value) -> Result<PromptPlan, ToolError> {
    let args: TokenArgs = parse_arguments(arguments, "token-yield-availability")?;

    Ok(PromptPlan {
        goal: "Map all significant yield opportunities for the given token.",
        steps: vec![
            "Call get-yields-by-token to enumerate opportunities.",
            "Fetch token://{tokenSymbol} for metadata and cross-chain availability.",
            "Cluster yields by type (staking, lending, vault) and APY tiers.",
            "Recommend deployments aligned with liquidity depth and risk tolerance.",
        ],
        arguments: serde_json::to_value(&args).map_err(|e| ToolError::internal(e.to_string()))?,
        recommended_tools: vec!["get-yields-by-token", "token://{tokenId}", "get-top-yields"],
        output_format: "Table grouped by yield type with APY ranges and risk commentary.",
    })
}
