//! Built-in Problem Catalogue

use timebox_core::Problem;

/// Every built-in problem, in display order
pub fn problems() -> Vec<Problem> {
    vec![p0001(), p0010(), p0023()]
}

fn p0001() -> Problem {
    Problem::new(1, "Multiples of 3 and 5")
        .line("If we list all the natural numbers below 10 that are multiples of 3 or 5, we get 3, 5, 6")
        .line("and 9. The sum of these multiples is 23.")
        .line("")
        .line("Find the sum of all the multiples of 3 or 5 below 1000.")
        .answer(233168)
        .method("naive", || (1..1000i64).filter(|n| n % 3 == 0 || n % 5 == 0).sum())
        .method("arithmetic", || {
            let below = |step: i64| {
                let count = 999 / step;
                step * count * (count + 1) / 2
            };
            below(3) + below(5) - below(15)
        })
}

const PRIMES_BELOW: i64 = 2_000_000;

fn p0010() -> Problem {
    Problem::new(10, "Summation of primes")
        .line("The sum of the primes below 10 is 2 + 3 + 5 + 7 = 17.")
        .line("")
        .line("Find the sum of all the primes below two million.")
        .answer(142913828922)
        .method("naive", prime_sum_trial_division)
        .method("sieve", prime_sum_sieve)
}

/// Trial division by the primes found so far
fn prime_sum_trial_division() -> i64 {
    let mut primes: Vec<i64> = vec![3, 5, 7, 11, 13, 17, 19];
    let mut sum = 2 + primes.iter().sum::<i64>();

    let mut candidate = 21;
    while candidate < PRIMES_BELOW {
        let composite = primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .any(|&p| candidate % p == 0);
        if !composite {
            primes.push(candidate);
            sum += candidate;
        }
        candidate += 2;
    }
    sum
}

fn prime_sum_sieve() -> i64 {
    let limit = PRIMES_BELOW as usize;
    let mut composite = vec![false; limit];
    let mut sum = 0i64;
    for n in 2..limit {
        if composite[n] {
            continue;
        }
        sum += n as i64;
        let mut multiple = n * n;
        while multiple < limit {
            composite[multiple] = true;
            multiple += n;
        }
    }
    sum
}

const ABUNDANT_LIMIT: usize = 28123;

fn p0023() -> Problem {
    Problem::new(23, "Non-abundant sums")
        .line("A number n is called abundant if the sum of its proper divisors exceeds n.")
        .line("")
        .line("Find the sum of all the positive integers which cannot be written as the sum of")
        .line("two abundant numbers.")
        .answer(4179871)
        .method("naive", non_abundant_sum_naive)
        .method("subtraction", non_abundant_sum_subtraction)
}

fn proper_divisor_sum(n: usize) -> usize {
    if n < 2 {
        return 0;
    }
    let mut sum = 1;
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            sum += i;
            if i * i != n {
                sum += n / i;
            }
        }
        i += 1;
    }
    sum
}

fn is_abundant(n: usize) -> bool {
    proper_divisor_sum(n) > n
}

/// Recomputes divisor sums for every pair; slow enough to hit the default method timeout
fn non_abundant_sum_naive() -> i64 {
    (1..=ABUNDANT_LIMIT)
        .filter(|&i| !(1..i).any(|j| is_abundant(j) && is_abundant(i - j)))
        .map(|i| i as i64)
        .sum()
}

fn non_abundant_sum_subtraction() -> i64 {
    let mut abundant = Vec::new();
    let mut is_abundant_at = vec![false; ABUNDANT_LIMIT + 1];
    let mut sum = 0i64;

    for n in 1..=ABUNDANT_LIMIT {
        if is_abundant(n) {
            abundant.push(n);
            is_abundant_at[n] = true;
        }
        let expressible = abundant
            .iter()
            .take_while(|&&a| a < n)
            .any(|&a| is_abundant_at[n - a]);
        if !expressible {
            sum += n as i64;
        }
    }
    sum
}
