/// Lua script for the shared token bucket
///
/// Runs atomically inside Redis, so concurrent callers from any number of
/// processes are serialized on the same pair of keys. A missing key reads as
/// a full bucket that was last refilled at the epoch.
///
/// KEYS[1] = remaining tokens
/// KEYS[2] = last refill timestamp (unix seconds)
/// ARGV[1] = refill rate (tokens per second)
/// ARGV[2] = capacity
/// ARGV[3] = current timestamp (unix seconds)
/// ARGV[4] = requested tokens
///
/// Returns: Lua `true` (integer reply 1) when allowed, Lua `false` (nil reply)
/// when denied.
pub const TOKEN_BUCKET_SCRIPT: &str = r#"
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])

-- Keep idle state around for two full refills, never less than a second
local ttl = math.max(1, math.floor(capacity / rate * 2))

local tokens = tonumber(redis.call('GET', KEYS[1]))
if tokens == nil then
    tokens = capacity
end

local last_refill = tonumber(redis.call('GET', KEYS[2]))
if last_refill == nil then
    last_refill = 0
end

local elapsed = math.max(0, now - last_refill)
local available = math.min(capacity, tokens + elapsed * rate)
local allowed = available >= requested
if allowed then
    available = available - requested
end

redis.call('SETEX', KEYS[1], ttl, available)
redis.call('SETEX', KEYS[2], ttl, now)

return allowed
"#;

/// Expiry applied to both bucket keys, mirroring the script's TTL rule
pub fn bucket_ttl_secs(rate: u32, capacity: u32) -> u64 {
    let fill_time = capacity as f64 / rate as f64;
    ((fill_time * 2.0).floor() as u64).max(1)
}
